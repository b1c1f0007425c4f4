//! CLI command handler implementations.

use crate::store::{EnvironmentPayload, EnvironmentRecord, EnvironmentStore};
use acs_common::{
    BackendRouter, ConnectionTester, TargetDescriptor, TestStatus,
};
use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn env_list(store: &EnvironmentStore, json: bool) -> Result<()> {
    let records = store.list()?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("no environments configured");
        return Ok(());
    }
    for record in records {
        let status = match record.last_test_status {
            Some(TestStatus::Ok) => "ok",
            Some(TestStatus::Error) => "error",
            Some(TestStatus::Timeout) => "timeout",
            None => "untested",
        };
        println!(
            "{}  {:<10} {:<24} [{}]",
            record.id, record.kind, record.title, status
        );
    }
    Ok(())
}

pub fn env_add(store: &EnvironmentStore, payload: EnvironmentPayload, json: bool) -> Result<()> {
    let record = store.insert(payload)?;
    if json {
        return print_json(&record);
    }
    println!("added {} ({})", record.title, record.id);
    Ok(())
}

pub async fn env_remove(store: &EnvironmentStore, router: &BackendRouter, id: &str) -> Result<()> {
    let removed = store.remove(id)?;
    // Tear down any pooled connections for the departed target; a record
    // with an unknown kind has nothing pooled to close.
    if let Ok(target) = removed.descriptor() {
        router.close_target(&target).await;
    }
    println!("removed {} ({})", removed.title, removed.id);
    Ok(())
}

pub async fn wsl_list(router: &BackendRouter, json: bool) -> Result<()> {
    if !router.wsl().check_available().await {
        bail!("wsl is not available on this host");
    }
    let distros = router.wsl().discover_distros().await?;
    if json {
        return print_json(&distros);
    }
    for distro in distros {
        println!(
            "{}{:<24} {:<8} v{}  {}",
            if distro.is_default { "* " } else { "  " },
            distro.name,
            distro.state.to_string(),
            distro.version,
            distro.home_path.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn wsl_start(router: &BackendRouter, name: &str) -> Result<()> {
    router.wsl().ensure_running(name).await?;
    println!("{name} is running");
    Ok(())
}

pub async fn wsl_stop(router: &BackendRouter, name: &str) -> Result<()> {
    router.wsl().stop_distro(name).await?;
    println!("{name} terminated");
    Ok(())
}

pub async fn wsl_set_default(router: &BackendRouter, name: &str) -> Result<()> {
    router.wsl().set_default_distro(name).await?;
    println!("{name} is now the default distribution");
    Ok(())
}

pub async fn test(
    store: &EnvironmentStore,
    router: Arc<BackendRouter>,
    id: &str,
    timeout_ms: u64,
    json: bool,
) -> Result<()> {
    let record = store.get(id)?;
    let target = record.descriptor()?;

    let tester =
        ConnectionTester::new(router).with_timeout(Duration::from_millis(timeout_ms));
    let report = tester.test(&target).await;
    let updated = store.record_test(id, &report)?;

    if json {
        return print_json(&report);
    }
    match report.status() {
        TestStatus::Ok => println!(
            "{}: ok ({} ms)",
            updated.title,
            report.latency_ms.unwrap_or_default()
        ),
        TestStatus::Timeout => println!(
            "{}: timeout ({})",
            updated.title,
            report.error.as_deref().unwrap_or("no detail")
        ),
        TestStatus::Error => println!(
            "{}: error ({})",
            updated.title,
            report.error.as_deref().unwrap_or("no detail")
        ),
    }
    Ok(())
}

fn resolve_target(store: &EnvironmentStore, id: &str) -> Result<(EnvironmentRecord, TargetDescriptor)> {
    let record = store.get(id)?;
    let target = record.descriptor()?;
    Ok((record, target))
}

pub async fn exec(
    store: &EnvironmentStore,
    router: &BackendRouter,
    id: &str,
    command: &str,
) -> Result<i32> {
    let (record, target) = resolve_target(store, id)?;
    debug!(target = %record.title, command, "exec");
    let result = router.exec(&target, command).await?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(result.exit_code)
}

pub async fn cat(store: &EnvironmentStore, router: &BackendRouter, id: &str, path: &str) -> Result<()> {
    let (_, target) = resolve_target(store, id)?;
    let content = router.read_file(&target, path).await?;
    print!("{content}");
    Ok(())
}

pub async fn put(
    store: &EnvironmentStore,
    router: &BackendRouter,
    id: &str,
    path: &str,
    content: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let (_, target) = resolve_target(store, id)?;
    let content = match (content, file) {
        (Some(content), None) => content,
        (None, Some(file)) => std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
        (Some(_), Some(_)) => bail!("--content and --file are mutually exclusive"),
    };
    router.write_file(&target, path, &content).await?;
    println!("wrote {} bytes to {path}", content.len());
    Ok(())
}

pub async fn rm(store: &EnvironmentStore, router: &BackendRouter, id: &str, path: &str) -> Result<()> {
    let (_, target) = resolve_target(store, id)?;
    router.unlink(&target, path).await?;
    println!("removed {path}");
    Ok(())
}

pub async fn home(store: &EnvironmentStore, router: &BackendRouter, id: &str) -> Result<()> {
    let (_, target) = resolve_target(store, id)?;
    println!("{}", router.home(&target).await?);
    Ok(())
}
