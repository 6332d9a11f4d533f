//! Preset scenarios against real images.

#[cfg(test)]
mod tests {
    use berth_presets::{Nginx, Postgres, Preset, Redis};

    use crate::{cleanup, init_tracing};

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn redis_answers_ping() {
        init_tracing();
        let redis = Redis::default().with_image("redis:7-alpine");
        let mut container = redis.container().unwrap();
        container.start().await.unwrap();

        let url = redis.redis_url(&container, 0).await;
        let pong = container.exec(["redis-cli", "ping"]).await;
        cleanup(&mut container).await;

        assert!(url.unwrap().starts_with("redis://"));
        assert_eq!(pong.unwrap().stdout.trim(), "PONG");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn postgres_accepts_queries() {
        init_tracing();
        let postgres = Postgres::default()
            .with_image("postgres:16-alpine")
            .with_database("orders");
        let mut container = postgres.container().unwrap();
        container.start().await.unwrap();

        let url = postgres.database_url(&container).await;
        let query = container
            .exec(["psql", "-U", "test", "-d", "orders", "-tAc", "select 1"])
            .await;
        cleanup(&mut container).await;

        assert!(url.unwrap().ends_with("/orders"));
        assert_eq!(query.unwrap().stdout.trim(), "1");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn nginx_serves_http() {
        init_tracing();
        let nginx = Nginx::default().with_image("nginx:alpine");
        let mut container = nginx.container().unwrap();
        container.start().await.unwrap();

        let url = nginx.server_url(&container).await;
        let fetched = container
            .exec(["wget", "-q", "-O", "-", "http://localhost/"])
            .await;
        cleanup(&mut container).await;

        assert!(url.unwrap().starts_with("http://"));
        assert!(fetched.unwrap().stdout.contains("nginx"));
    }
}
