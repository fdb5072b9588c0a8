use dotenvy;

#[derive(Debug)]
pub struct AppConfig {
    pub db_namespace: String,
    pub db_database: String,
    pub db_password: Option<String>,
    pub db_username: Option<String>,
    pub db_url: String,
    pub jwt_secret: String,
    pub is_development: bool,
    pub port: u16,
    pub default_max_applications: u16,
    pub starting_credits: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let db_namespace = std::env::var("DB_NAMESPACE").unwrap_or("namespace".to_string());
        let db_database = std::env::var("DB_DATABASE").unwrap_or("database".to_string());
        let db_password = std::env::var("DB_PASSWORD").ok();
        let db_username = std::env::var("DB_USERNAME").ok();
        let db_url = std::env::var("DB_URL").expect("Missing DB_URL in env");

        let jwt_secret = std::env::var("JWT_SECRET").expect("Missing JWT_SECRET in env");

        let is_development = std::env::var("DEVELOPMENT")
            .expect("set DEVELOPMENT env var")
            .eq("true");

        let port: u16 = std::env::var("PORT")
            .unwrap_or("8080".to_string())
            .parse()
            .expect("PORT should be number");

        let default_max_applications: u16 = std::env::var("DEFAULT_MAX_APPLICATIONS")
            .unwrap_or("10".to_string())
            .parse()
            .expect("DEFAULT_MAX_APPLICATIONS should be number");

        let starting_credits: i64 = std::env::var("STARTING_CREDITS")
            .unwrap_or("0".to_string())
            .parse()
            .expect("STARTING_CREDITS should be number");

        Self {
            db_namespace,
            db_database,
            db_password,
            db_username,
            db_url,
            jwt_secret,
            is_development,
            port,
            default_max_applications,
            starting_credits,
        }
    }
}
