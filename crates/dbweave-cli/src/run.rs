use std::future::Future;
use std::path::PathBuf;

use clap::Args;
use dbweave_core::{HttpEndpoint, Page, QueryError};
use dbweave_widgets::Snapshot;
use tokio::task::LocalSet;

use crate::error::{CliError, Result};
use crate::manifest::Manifest;

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Page manifest (JSON).
    #[arg(long)]
    pub manifest: PathBuf,

    /// Query service origin, overriding the manifest's `origin`.
    #[arg(long = "service")]
    pub service: Option<String>,

    /// Print one JSON object per component instead of a summary line.
    #[arg(long)]
    pub json: bool,
}

/// Drive `future` to completion on a current-thread runtime with a local
/// task set, which page fetches and timers are spawned onto.
pub(crate) fn on_local_runtime<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()
        .map_err(CliError::Runtime)?;
    LocalSet::new().block_on(&runtime, future)
}

/// Mount every component of `manifest` against `origin`, wait for the page
/// to settle and return each component's final state.
pub fn run_manifest(manifest: &Manifest, origin: &str) -> Result<Vec<Snapshot>> {
    let endpoint = HttpEndpoint::new(origin)?;
    on_local_runtime(async {
        let page = Page::with_config(endpoint, manifest.page_config());
        let widgets = manifest.assemble(&page).into_result()?;
        tracing::info!(message = "run.mount", components = widgets.len(), origin);
        for widget in &widgets {
            widget.mount();
        }
        page.settle().await;
        Ok(widgets.iter().map(|w| w.snapshot()).collect())
    })
}

/// One summary line per component.
#[must_use]
pub fn summary(snapshot: &Snapshot) -> String {
    let state = serde_json::to_value(snapshot.state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "{:<16} {:<10} {:<8} rows={}",
        snapshot.id, snapshot.kind, state, snapshot.rows
    );
    if !snapshot.value.is_empty() {
        let value = serde_json::to_string(&snapshot.value).unwrap_or_default();
        line.push_str(&format!(" value={value}"));
    }
    if let Some(fault) = &snapshot.fault {
        line.push_str(&format!(" fault={fault:?}"));
    }
    line
}

pub fn run_page(args: RunArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let origin = args
        .service
        .or_else(|| manifest.origin.clone())
        .ok_or_else(|| QueryError::Transport("no service origin: pass --service or set `origin`".into()))?;
    let snapshots = run_manifest(&manifest, &origin)?;
    for snapshot in &snapshots {
        if args.json {
            println!("{}", serde_json::to_string(snapshot)?);
        } else {
            println!("{}", summary(snapshot));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbweave_core::{ComponentValue, LoadState};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn summary_shows_value_and_fault_when_present() {
        let mut snapshot = Snapshot {
            id: "a1".into(),
            kind: "db-table",
            state: LoadState::Loaded,
            value: ComponentValue::Absent,
            rows: 3,
            silent: false,
            fault: None,
            diagnostics: Vec::new(),
        };
        assert_eq!(
            summary(&snapshot),
            "a1               db-table   loaded   rows=3"
        );

        snapshot.value = ComponentValue::Scalar(json!(7));
        snapshot.fault = Some("boom".into());
        assert_eq!(
            summary(&snapshot),
            "a1               db-table   loaded   rows=3 value=7 fault=\"boom\""
        );
    }

    #[test]
    fn bad_origin_is_an_endpoint_error() {
        let manifest: Manifest = serde_json::from_str(r#"{"components": []}"#).expect("manifest");
        let err = run_manifest(&manifest, "not a url").expect_err("origin");
        assert!(matches!(err, CliError::Endpoint(QueryError::Transport(_))));
    }
}
