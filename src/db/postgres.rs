use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;

// Spawn a lightweight keepalive task for a Postgres client connection.
// Adds jitter to avoid synchronized spikes and ignores errors (best-effort).
// The ping waits for the client lock so it never lands inside a transaction.
pub fn spawn_keepalive(client: Arc<Mutex<Client>>, min_secs: u64, max_secs: u64) {
    let max_secs = max_secs.max(min_secs + 1);
    tokio::spawn(async move {
        loop {
            let jitter = {
                let mut rng2 = rand::rng();
                rand::Rng::random_range(&mut rng2, min_secs..=max_secs)
            };
            tokio::time::sleep(std::time::Duration::from_secs(jitter)).await;
            let c = Arc::clone(&client);
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async move {
                let guard = c.lock().await;
                guard.execute("SELECT 1", &[]).await
            })
            .await;
            // Ignore errors; next loop will try again.
        }
    });
}
