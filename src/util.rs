const DB_HOST: &str = "DB_HOST";

const DEFAULT_DB_HOST: &str = "127.0.0.1";

pub fn get_db_host() -> String {
    std::env::var(DB_HOST).unwrap_or_else(|_| DEFAULT_DB_HOST.to_string())
}

const DB_PORT: &str = "DB_PORT";

const DEFAULT_DB_PORT: u16 = 5432;

pub fn get_db_port() -> u16 {
    let port_from_env = std::env::var(DB_PORT);
    port_from_env.map_or(DEFAULT_DB_PORT, |res| res.parse().unwrap_or(DEFAULT_DB_PORT))
}

const DB_USER: &str = "POSTGRES_USER";

const DEFAULT_DB_USER: &str = "postgres";

pub fn get_db_user() -> String {
    std::env::var(DB_USER).unwrap_or_else(|_| DEFAULT_DB_USER.to_string())
}

const DB_PASSWORD: &str = "POSTGRES_PASSWORD";

pub fn get_db_password() -> String {
    std::env::var(DB_PASSWORD).unwrap_or_default()
}

const DB_NAME: &str = "DB_NAME";

const DEFAULT_DB_NAME: &str = "postgres";

pub fn get_db_name() -> String {
    std::env::var(DB_NAME).unwrap_or_else(|_| DEFAULT_DB_NAME.to_string())
}

const RESULT_TABLE: &str = "RESULT_TABLE";

const DEFAULT_RESULT_TABLE: &str = "web_results";

pub fn get_result_table() -> String {
    std::env::var(RESULT_TABLE).unwrap_or_else(|_| DEFAULT_RESULT_TABLE.to_string())
}

const ERROR_TABLE: &str = "ERROR_TABLE";

const DEFAULT_ERROR_TABLE: &str = "web_errors";

pub fn get_error_table() -> String {
    std::env::var(ERROR_TABLE).unwrap_or_else(|_| DEFAULT_ERROR_TABLE.to_string())
}
