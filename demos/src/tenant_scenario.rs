use futures::StreamExt;
use serde_json::json;
use tracing::*;

use tenancy_platform::{AddonSpec, CronHPA, Platform, RegistryConfig};
use tenancy_registry::core::{
    params::{DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams},
    Context, ResourceExt, UserInfo, WatchEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tenancy_registry=debug")),
        )
        .init();

    let config = RegistryConfig::infer()?;
    let platform = Platform::new(&config)?;
    info!("serving {platform:?}");

    let t1 = Context::for_user(UserInfo::new("alice", "t1"));
    let t2 = Context::for_user(UserInfo::new("bob", "t2"));
    let as_t1 = platform.cronhpas(&t1);
    let as_t2 = platform.cronhpas(&t2);

    // Follow everything t1 can see while the scenario runs
    let mut events = as_t1.watch(&WatchParams::default(), "0").await?;
    let follower = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                WatchEvent::Added(o) => info!("t1 watch: added {}", o.name_any()),
                WatchEvent::Modified(o) => info!("t1 watch: modified {}", o.name_any()),
                WatchEvent::Deleted(o) => info!("t1 watch: deleted {}", o.name_any()),
                WatchEvent::Bookmark(_) => {}
                WatchEvent::Error(e) => warn!("t1 watch: {}", e.message),
            }
        }
    });

    let mut cronhpa = CronHPA::default();
    cronhpa.metadata.name = Some("a".into());
    cronhpa.spec = AddonSpec {
        cluster_name: "cls-demo".into(),
        ..AddonSpec::default()
    };
    let created = as_t1.create(&PostParams::default(), &cronhpa).await?;
    info!("t1 created {} owned by {}", created.name_any(), created.spec.tenant_id);

    match as_t2.get_opt("a").await? {
        Some(_) => warn!("t2 can see an object of t1"),
        None => info!("t2 cannot see a"),
    }

    let status = Patch::Merge(json!({
        "spec": { "clusterName": "ignored" },
        "status": { "phase": "Running", "version": created.spec.version },
    }));
    let patched = as_t1.patch_status("a", &PatchParams::default(), &status).await?;
    info!(
        "t1 patched status of a to {:?}, cluster is still {}",
        patched.status.map(|s| s.phase),
        patched.spec.cluster_name
    );

    let visible = as_t1.list(&ListParams::default()).await?;
    info!("t1 lists {} cronhpas", visible.len());

    as_t1.delete("a", &DeleteParams::default()).await?;
    if let Err(err) = as_t1.get("a").await {
        info!("after delete: {err}");
    }

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    follower.abort();
    Ok(())
}
