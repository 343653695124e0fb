use std::env;

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    /// Minimum live members (assignments + leader) a crew needs before a
    /// group conversation is kept alive.
    pub group_chat_min_members: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let group_chat_min_members = env::var("GROUP_CHAT_MIN_MEMBERS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2);

        Self {
            mongo_uri: env::var("MONGO_URI").expect("MONGO_URI must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "crew_db".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            group_chat_min_members,
        }
    }
}
