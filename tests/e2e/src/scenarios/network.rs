//! Network scenarios.

#[cfg(test)]
mod tests {
    use berth_core::{connection, DockerContainer, Error, Network, SharedNetworkRegistry};

    use crate::{cleanup, init_tracing, sleeper, unique_name};

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn network_lifecycle() {
        init_tracing();
        let network = Network::new().unwrap();

        network.create().await.unwrap();
        let info = network.info().await.unwrap();
        assert_eq!(info.name.as_deref(), Some(network.name()));

        network.close(false).await.unwrap();
        network.close(false).await.unwrap();
        assert!(!network.is_created().await);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn duplicate_name_is_rejected() {
        init_tracing();
        let name = unique_name("berth-dup");
        let first = Network::new().unwrap().with_name(&name);
        let second = Network::new().unwrap().with_name(&name);

        first.create().await.unwrap();
        let err = second.create().await.unwrap_err();
        first.close(false).await.unwrap();

        assert!(matches!(err, Error::NetworkAlreadyExists(_)), "got {:?}", err);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn containers_reach_each_other_by_alias() {
        init_tracing();
        let network = Network::new().unwrap();
        network.create().await.unwrap();

        let mut server = DockerContainer::new(
            sleeper()
                .with_network(&network)
                .with_network_aliases(["server"]),
        )
        .unwrap();
        let mut client = DockerContainer::new(sleeper().with_network(&network)).unwrap();
        server.start().await.unwrap();
        client.start().await.unwrap();

        let ping = client.exec(["ping", "-c", "1", "server"]).await;
        let in_use = network.close(false).await;

        cleanup(&mut client).await;
        cleanup(&mut server).await;
        let closed = network.close(false).await;

        assert!(ping.unwrap().success());
        assert!(matches!(in_use, Err(Error::NetworkInUse(_))));
        closed.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn shared_network_survives_close_until_shutdown() {
        init_tracing();
        let registry = SharedNetworkRegistry::new(connection().unwrap());

        let shared = registry.get_or_create_shared().await.unwrap();
        shared.close(false).await.unwrap();
        let still_there = shared.info().await;

        registry.shutdown().await.unwrap();

        assert!(still_there.is_ok());
        assert!(!shared.is_created().await);
        assert_eq!(registry.cleanup_registrations(), 1);
    }
}
