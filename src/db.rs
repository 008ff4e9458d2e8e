use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

pub async fn establish_connection(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}
