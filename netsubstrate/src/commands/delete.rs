use anyhow::Context;
use log::info;
use netsubstrate_core::{
    call::CallContext,
    reconciler::{cluster::ClusterReconciler, network_interface::NetworkInterfaceReconciler},
    scope::ClusterScope,
};

use crate::cli::ApplyArgs;

use super::Session;

pub async fn delete(args: ApplyArgs, call: CallContext) -> anyhow::Result<()> {
    let session = Session::open(&args.config, args.state.as_deref()).await?;
    let scope = session
        .config
        .scope(session.allocated.clone())
        .with_call_context(call);

    let result = delete_network(&session, &scope).await;

    session
        .finish(scope.into_allocated(), args.state.as_deref(), args.output, result)
        .await
}

/// Interfaces go first, they hold references to the subnets and balancers.
async fn delete_network(session: &Session, scope: &ClusterScope) -> anyhow::Result<()> {
    let clients = session.provider.clients();
    let interfaces = session.interfaces(scope)?;

    NetworkInterfaceReconciler::new(&clients)
        .delete_all(scope, &interfaces)
        .await
        .context("Couldn't delete the machine interfaces!")?;

    info!("Deleted {} machine interface(s)", interfaces.len());

    ClusterReconciler::new(&clients)
        .delete(scope)
        .await
        .context("Couldn't delete the cluster network!")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::{reconcile::reconcile_network, tests::demo_session};

    use super::delete_network;

    #[tokio::test]
    async fn delete_leaves_nothing_behind() {
        let session = demo_session().await;
        let mut scope = session.config.scope(session.allocated.clone());

        reconcile_network(&session, &mut scope).await.unwrap();

        delete_network(&session, &scope).await.unwrap();

        assert_eq!(session.provider.resource_count().await, 0);
    }

    #[tokio::test]
    async fn delete_of_a_missing_network_succeeds() {
        let session = demo_session().await;
        let scope = session.config.scope(session.allocated.clone());

        delete_network(&session, &scope).await.unwrap();

        assert!(session.provider.journal().await.is_empty());
    }
}
