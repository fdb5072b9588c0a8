use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::info;

pub type Db = Surreal<Any>;

#[derive(Debug)]
pub struct DbConfig<'a> {
    pub url: &'a str,
    pub database: &'a str,
    pub namespace: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

#[derive(Debug)]
pub struct Database {
    pub client: Db,
}

impl Database {
    pub async fn connect(config: DbConfig<'_>) -> Self {
        info!("connecting DB config = {:?}", config);
        let conn = connect(config.url)
            .await
            .expect("Failed to connect to SurrealDB");

        if let (Some(username), Some(password)) = (config.username, config.password) {
            conn.signin(Root { username, password })
                .await
                .expect("Failed to sign in to SurrealDB");
        }

        conn.use_ns(config.namespace)
            .use_db(config.database)
            .await
            .expect("Failed to select namespace and database");

        let version = conn
            .version()
            .await
            .expect("Failed to get SurrealDB version");

        info!("connected DB version: {version}");
        Self { client: conn }
    }
}
