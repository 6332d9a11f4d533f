//! Container lifecycle scenarios.

#[cfg(test)]
mod tests {
    use berth_core::{
        ContainerSpec, DockerContainer, Engine, Error, HealthCheckOptions, LifecycleState,
        WaitStrategy,
    };
    use std::time::{Duration, Instant};

    use crate::{cleanup, init_tracing, sleeper, unique_name, ALPINE};

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn redis_gets_a_dynamic_port() {
        init_tracing();
        let spec = ContainerSpec::new("redis:7-alpine")
            .with_exposed_port(6379)
            .unwrap()
            .with_default_wait_for()
            .unwrap();
        let mut redis = DockerContainer::new(spec).unwrap();

        redis.start().await.unwrap();
        let port = redis.mapped_port(6379).await.unwrap();
        let host = redis.host().await.unwrap();
        cleanup(&mut redis).await;

        assert!(port > 0);
        assert_ne!(port, 6379);
        assert!(!host.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn log_wait_returns_after_ready_line() {
        init_tracing();
        let spec = ContainerSpec::new(ALPINE)
            .with_command(["sh", "-c", "sleep 2; echo ready; sleep 60"])
            .with_wait_for(
                WaitStrategy::logs("(?i)ready")
                    .unwrap()
                    .with_timeout(Duration::from_secs(5)),
            );
        let mut container = DockerContainer::new(spec).unwrap();

        // Pull outside the measured window.
        container.engine().pull_image(ALPINE, &Default::default()).await.unwrap();

        let started = Instant::now();
        let result = container.start().await.map(|_| ());
        let elapsed = started.elapsed();
        cleanup(&mut container).await;

        result.unwrap();
        assert!(elapsed >= Duration::from_secs(2), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn log_wait_times_out() {
        init_tracing();
        let spec = sleeper().with_wait_for(
            WaitStrategy::logs("never printed")
                .unwrap()
                .with_timeout(Duration::from_secs(1)),
        );
        let mut container = DockerContainer::new(spec).unwrap();

        let err = container.start().await.map(|_| ()).unwrap_err();
        let still_running = container.running().await.unwrap();
        cleanup(&mut container).await;

        assert!(matches!(err, Error::Timeout(_)));
        assert!(still_running);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn stop_before_start_is_rejected() {
        init_tracing();
        let mut container = DockerContainer::new(sleeper()).unwrap();

        assert!(matches!(
            container.stop().await,
            Err(Error::ContainerNotStarted)
        ));
        assert!(!container.running().await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn full_lifecycle_with_name_and_restart() {
        init_tracing();
        let name = unique_name("berth-lifecycle");
        let mut container = DockerContainer::new(sleeper().with_name(&name)).unwrap();

        container.start().await.unwrap();
        assert_eq!(container.name(), Some(name.as_str()));
        assert!(container.created_at().is_some());

        container.stop_force().await.unwrap();
        assert!(container.exited().await.unwrap());

        container.restart().await.unwrap();
        assert!(container.running().await.unwrap());

        container.kill("SIGKILL").await.unwrap();
        container.remove().await.unwrap();
        container.remove().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Removed);
        assert!(!container.exists().await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn missing_image_is_reported() {
        init_tracing();
        let name = format!("berth/{}:latest", unique_name("does-not-exist"));
        let mut container = DockerContainer::new(ContainerSpec::new(name)).unwrap();

        let err = container.start().await.map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::ImageNotFound(_)), "got {:?}", err);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn exec_captures_output_and_exit_code() {
        init_tracing();
        let spec = sleeper().with_env(("GREETING", "hello")).unwrap();
        let mut container = DockerContainer::new(spec).unwrap();
        container.start().await.unwrap();

        let ok = container.exec(["sh", "-c", "echo $GREETING"]).await.unwrap();
        let failed = container.exec(["sh", "-c", "echo oops >&2; exit 3"]).await.unwrap();
        cleanup(&mut container).await;

        assert_eq!(ok.stdout.trim(), "hello");
        assert!(ok.success());
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr.trim(), "oops");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn files_copy_in_and_out() {
        init_tracing();
        let mut container = DockerContainer::new(sleeper()).unwrap();
        container.start().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("motd");
        let result = async {
            container
                .copy_file_to_container("/tmp/motd", "welcome aboard")
                .await?;
            let cat = container.exec(["cat", "/tmp/motd"]).await?;
            container
                .copy_file_from_container_to("/tmp/motd", &target)
                .await?;
            Ok::<_, Error>(cat.stdout)
        }
        .await;
        cleanup(&mut container).await;

        assert_eq!(result.unwrap(), "welcome aboard");
        assert_eq!(std::fs::read_to_string(target).unwrap(), "welcome aboard");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn healthcheck_wait() {
        init_tracing();
        let spec = sleeper()
            .with_healthcheck(
                HealthCheckOptions::new(["true"])
                    .interval(1.0)
                    .timeout(1.0),
            )
            .unwrap()
            .with_wait_for(WaitStrategy::healthcheck().with_timeout(Duration::from_secs(30)));
        let mut container = DockerContainer::new(spec).unwrap();

        let result = container.start().await.map(|_| ());
        let healthy = container.healthy().await;
        cleanup(&mut container).await;

        result.unwrap();
        assert!(healthy.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn scoped_container_is_stopped() {
        init_tracing();
        let mut container = DockerContainer::new(sleeper()).unwrap();

        let output = container
            .scoped(|c| Box::pin(async move { c.exec(["echo", "inside"]).await }))
            .await
            .unwrap();
        let running = container.running().await.unwrap();
        container.remove().await.unwrap();

        assert_eq!(output.stdout.trim(), "inside");
        assert!(!running);
    }
}
