//! Connection settings for tests that talk to a real SQL Server.

/// Environment variable holding an `mssql://` URI for integration tests.
pub const TEST_URI_ENV: &str = "SQLIMPORT_TEST_MSSQL_URI";

/// Defaults match the SQL Server 2022 container used in CI.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            database: "sqlimport_test".to_string(),
            username: "sa".to_string(),
            password: "Sqlimport_Test_123!".to_string(),
        }
    }
}

impl TestDbConfig {
    /// URI from [`TEST_URI_ENV`], falling back to the container defaults.
    pub fn uri_from_env() -> String {
        std::env::var(TEST_URI_ENV).unwrap_or_else(|_| Self::default().uri())
    }

    pub fn uri(&self) -> String {
        format!(
            "mssql://{}:{}@{}:{}/{}?trust_cert=true",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}
