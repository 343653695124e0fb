use log::info;
use mongodb::{options::ClientOptions, Client, Database};

/// Connection bootstrap. All collections (workers, crews, assignments,
/// projects, conversations, messages, archived_chats, notifications) hang
/// off the single database handle.
pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Invalid MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to build MongoDB client");
        let db = client.database(db_name);
        info!("Connected to database '{}'", db_name);
        MongoDB { client, db }
    }
}
