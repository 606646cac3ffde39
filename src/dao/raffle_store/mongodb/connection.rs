use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 10;
const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(5);

/// Build a client for `database_name` and wait until the server answers a ping.
///
/// Pings back off exponentially from 250 ms up to 5 s between attempts.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let mut options = options.clone();
    options.app_name.get_or_insert_with(|| "raffle-back".to_owned());
    let client = Client::with_options(options)
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delay = FIRST_PING_DELAY;
    let mut attempt = 1;
    while let Err(err) = database.run_command(doc! { "ping": 1 }).await {
        if attempt >= PING_ATTEMPTS {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source: err,
            });
        }
        debug!(attempt, database = database_name, error = %err, "MongoDB ping failed; retrying");
        sleep(delay).await;
        delay = (delay * 2).min(MAX_PING_DELAY);
        attempt += 1;
    }

    Ok((client, database))
}
