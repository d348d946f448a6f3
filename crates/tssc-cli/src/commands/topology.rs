//! Topology command - show the deployment plan for the cluster configuration

use crate::context::Context;
use crate::error::Result;

pub async fn run(ctx: &Context) -> Result<()> {
    let cfs = ctx.chart_fs()?;
    let collection = ctx.collection(&cfs)?;
    let kube = ctx.kube().await?;
    let cfg = ctx.cluster_config(kube).await?;

    let topology = ctx.topology(&cfg, &collection)?;
    topology.print(&mut std::io::stdout().lock())?;
    Ok(())
}
