use std::path::PathBuf;

use clap::Args;
use dbweave_core::{Node, Page, QueryEndpoint, QueryError, QueryFuture, QueryRequest};
use dbweave_widgets::Widget;
use serde::Serialize;

use crate::error::Result;
use crate::manifest::Manifest;

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Page manifest (JSON).
    #[arg(long)]
    pub manifest: PathBuf,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Endpoint for validation runs: nothing is mounted, and the option lists
/// forms request while being configured are answered with a transport error.
#[derive(Debug, Clone, Copy, Default)]
struct Offline;

impl QueryEndpoint for Offline {
    fn execute(&self, request: QueryRequest) -> QueryFuture {
        tracing::trace!(message = "check.offline", statement = %request.statement);
        Box::pin(async { Err(QueryError::Transport("offline validation".into())) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub components: usize,
    pub dependencies: usize,
    pub warnings: Vec<String>,
}

/// Build the page described by `manifest` without touching the network.
///
/// Rejected properties, duplicate ids and dependency cycles fail the check.
/// Logged conflicts and producers that no component declares are warnings.
pub fn check_manifest(manifest: &Manifest) -> Result<CheckReport> {
    crate::run::on_local_runtime(async {
        let page = Page::with_config(Offline, manifest.page_config());
        let widgets = manifest.assemble(&page).into_result()?;
        let report = CheckReport {
            components: widgets.len(),
            dependencies: page.graph().edge_count(),
            warnings: warnings(&page, &widgets),
        };
        Ok(report)
    })
}

fn warnings(page: &Page, widgets: &[Widget]) -> Vec<String> {
    let mut warnings = Vec::new();
    for widget in widgets {
        let core = widget.node().core();
        let id = core.id();
        for diagnostic in core.diagnostics() {
            warnings.push(format!("{id}: {diagnostic}"));
        }
        let wiring = core.wiring();
        let producers = wiring
            .producer()
            .map(|p| p.producer())
            .into_iter()
            .chain(wiring.selection());
        for producer in producers {
            if page.lookup(producer.as_str()).is_none() {
                warnings.push(format!("{id}: producer `{producer}` is not declared"));
            }
        }
    }
    warnings
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let report = check_manifest(&manifest)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    println!(
        "{}: {} components, {} dependencies",
        args.manifest.display(),
        report.components,
        report.dependencies
    );
    Ok(())
}
