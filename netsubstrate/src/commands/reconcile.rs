use anyhow::Context;
use log::{debug, info};
use netsubstrate_core::{
    call::CallContext,
    reconciler::{cluster::ClusterReconciler, network_interface::NetworkInterfaceReconciler},
    scope::ClusterScope,
};

use crate::cli::ApplyArgs;

use super::Session;

pub async fn reconcile(args: ApplyArgs, call: CallContext) -> anyhow::Result<()> {
    let session = Session::open(&args.config, args.state.as_deref()).await?;
    let mut scope = session
        .config
        .scope(session.allocated.clone())
        .with_call_context(call);

    let result = reconcile_network(&session, &mut scope).await;
    let allocated = scope.into_allocated();

    if let (Some(ip_name), Some(dns_name)) =
        (&allocated.api_server_ip_name, &allocated.api_server_dns_name)
    {
        info!("API server endpoint: public IP '{ip_name}', DNS name '{dns_name}'");
    }
    debug!("Allocated state: {allocated:?}");

    session
        .finish(allocated, args.state.as_deref(), args.output, result)
        .await
}

pub(super) async fn reconcile_network(
    session: &Session,
    scope: &mut ClusterScope,
) -> anyhow::Result<()> {
    let clients = session.provider.clients();

    ClusterReconciler::new(&clients)
        .reconcile(scope)
        .await
        .context("Couldn't reconcile the cluster network!")?;

    let interfaces = session.interfaces(scope)?;

    NetworkInterfaceReconciler::new(&clients)
        .reconcile_all(scope, &interfaces)
        .await
        .context("Couldn't reconcile the machine interfaces!")?;

    info!("Reconciled {} machine interface(s)", interfaces.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use netsubstrate_core::{
        error::Operation,
        resources::{network::GroupProperties, ResourceId, ResourceKind},
    };

    use crate::commands::tests::demo_session;

    use super::reconcile_network;

    #[tokio::test]
    async fn demo_cluster_reconciles_from_scratch() {
        let session = demo_session().await;
        let mut scope = session.config.scope(session.allocated.clone());

        reconcile_network(&session, &mut scope).await.unwrap();

        let journal = session.provider.journal().await;
        let created = |kind: ResourceKind| {
            journal
                .iter()
                .filter(|mutation| mutation.kind == kind)
                .filter(|mutation| mutation.operation == Operation::CreateOrUpdate)
                .count()
        };

        assert_eq!(created(ResourceKind::ResourceGroup), 1);
        assert_eq!(created(ResourceKind::NetworkInterface), 2);
        assert_eq!(created(ResourceKind::InboundNatRule), 1);
        assert!(scope.allocated().api_server_ip_name.is_some());
        assert_eq!(scope.failure_domains().len(), 3);
        assert!(session
            .provider
            .lookup::<GroupProperties>(&ResourceId::group("demo-rg"))
            .await
            .is_some());
    }
}
