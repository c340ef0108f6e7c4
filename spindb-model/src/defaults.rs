use crate::engine::Engine;

/// Where an engine's pid file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileLocation {
    /// Inside the container directory; SpinDB writes it at spawn time.
    ContainerDir,
    /// Inside the data directory; the server writes it itself
    /// (PostgreSQL's `postmaster.pid`).
    DataDir,
}

/// Static per-engine facts: versions, ports, file names, tool names, and
/// timing constants. One instance per engine, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct EngineDefaults {
    pub engine: Engine,
    pub default_version: &'static str,
    pub latest_major: &'static str,
    pub default_port: u16,
    /// Inclusive allocation range; `(0, 0)` for file-based engines.
    pub port_range: (u16, u16),
    pub superuser: Option<&'static str>,
    /// Connection-string scheme, e.g. `postgresql` or `http`.
    pub scheme: &'static str,
    pub log_file: &'static str,
    pub pid_file: &'static str,
    pub pid_location: PidFileLocation,
    /// Data subdirectory under the container dir; for file-based engines
    /// this is the data file name suffix instead.
    pub data_subdir: &'static str,
    /// Server executable name, without platform extension.
    pub server_binary: &'static str,
    /// Client tool executables shipped alongside the server (or expected
    /// on PATH for file-based engines).
    pub client_tools: &'static [&'static str],
    pub max_connections: Option<u32>,
    /// How long `start` waits for the readiness probe before giving up.
    pub readiness_timeout_secs: u64,
    /// Graceful-stop window before escalating to a kill.
    pub stop_grace_secs: u64,
}

impl EngineDefaults {
    /// Look up the static defaults for `engine`.
    pub const fn for_engine(engine: Engine) -> &'static EngineDefaults {
        match engine {
            Engine::PostgreSql => &POSTGRESQL,
            Engine::MySql => &MYSQL,
            Engine::MariaDb => &MARIADB,
            Engine::Sqlite => &SQLITE,
            Engine::DuckDb => &DUCKDB,
            Engine::Redis => &REDIS,
            Engine::Valkey => &VALKEY,
            Engine::MongoDb => &MONGODB,
            Engine::FerretDb => &FERRETDB,
            Engine::ClickHouse => &CLICKHOUSE,
            Engine::Qdrant => &QDRANT,
            Engine::Meilisearch => &MEILISEARCH,
            Engine::QuestDb => &QUESTDB,
        }
    }
}

static POSTGRESQL: EngineDefaults = EngineDefaults {
    engine: Engine::PostgreSql,
    default_version: "17.5",
    latest_major: "18",
    default_port: 5432,
    port_range: (5432, 5600),
    superuser: Some("postgres"),
    scheme: "postgresql",
    log_file: "postgres.log",
    pid_file: "postmaster.pid",
    pid_location: PidFileLocation::DataDir,
    data_subdir: "data",
    server_binary: "postgres",
    client_tools: &["psql", "pg_dump", "pg_restore", "pg_isready", "initdb", "pg_ctl"],
    max_connections: Some(100),
    readiness_timeout_secs: 30,
    stop_grace_secs: 5,
};

static MYSQL: EngineDefaults = EngineDefaults {
    engine: Engine::MySql,
    default_version: "8.4.5",
    latest_major: "9",
    default_port: 3306,
    port_range: (3306, 3450),
    superuser: Some("root"),
    scheme: "mysql",
    log_file: "mysql.log",
    pid_file: "mysqld.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "mysqld",
    client_tools: &["mysql", "mysqldump", "mysqladmin"],
    max_connections: Some(151),
    readiness_timeout_secs: 60,
    stop_grace_secs: 5,
};

static MARIADB: EngineDefaults = EngineDefaults {
    engine: Engine::MariaDb,
    default_version: "11.8.2",
    latest_major: "11",
    default_port: 3306,
    port_range: (3306, 3450),
    superuser: Some("root"),
    scheme: "mysql",
    log_file: "mariadb.log",
    pid_file: "mariadbd.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "mariadbd",
    client_tools: &["mariadb", "mariadb-dump", "mariadb-admin"],
    max_connections: Some(151),
    readiness_timeout_secs: 60,
    stop_grace_secs: 5,
};

static SQLITE: EngineDefaults = EngineDefaults {
    engine: Engine::Sqlite,
    default_version: "3.50.1",
    latest_major: "3",
    default_port: 0,
    port_range: (0, 0),
    superuser: None,
    scheme: "sqlite",
    log_file: "",
    pid_file: "",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "sqlite",
    server_binary: "sqlite3",
    client_tools: &["sqlite3"],
    max_connections: None,
    readiness_timeout_secs: 0,
    stop_grace_secs: 0,
};

static DUCKDB: EngineDefaults = EngineDefaults {
    engine: Engine::DuckDb,
    default_version: "1.3.1",
    latest_major: "1",
    default_port: 0,
    port_range: (0, 0),
    superuser: None,
    scheme: "duckdb",
    log_file: "",
    pid_file: "",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "duckdb",
    server_binary: "duckdb",
    client_tools: &["duckdb"],
    max_connections: None,
    readiness_timeout_secs: 0,
    stop_grace_secs: 0,
};

static REDIS: EngineDefaults = EngineDefaults {
    engine: Engine::Redis,
    default_version: "8.0.2",
    latest_major: "8",
    default_port: 6379,
    port_range: (6379, 6500),
    superuser: Some("default"),
    scheme: "redis",
    log_file: "redis.log",
    pid_file: "redis.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "redis-server",
    client_tools: &["redis-cli"],
    max_connections: Some(10000),
    readiness_timeout_secs: 30,
    stop_grace_secs: 2,
};

static VALKEY: EngineDefaults = EngineDefaults {
    engine: Engine::Valkey,
    default_version: "8.1.1",
    latest_major: "8",
    default_port: 6379,
    port_range: (6379, 6500),
    superuser: Some("default"),
    scheme: "redis",
    log_file: "valkey.log",
    pid_file: "valkey.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "valkey-server",
    client_tools: &["valkey-cli"],
    max_connections: Some(10000),
    readiness_timeout_secs: 30,
    stop_grace_secs: 2,
};

static MONGODB: EngineDefaults = EngineDefaults {
    engine: Engine::MongoDb,
    default_version: "8.0.9",
    latest_major: "8",
    default_port: 27017,
    port_range: (27017, 27100),
    superuser: None,
    scheme: "mongodb",
    log_file: "mongod.log",
    pid_file: "mongod.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "mongod",
    client_tools: &["mongosh", "mongodump", "mongorestore"],
    max_connections: None,
    readiness_timeout_secs: 60,
    stop_grace_secs: 5,
};

static FERRETDB: EngineDefaults = EngineDefaults {
    engine: Engine::FerretDb,
    default_version: "1.24.0",
    latest_major: "1",
    default_port: 27017,
    port_range: (27017, 27100),
    superuser: None,
    scheme: "mongodb",
    log_file: "ferretdb.log",
    pid_file: "ferretdb.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "ferretdb",
    client_tools: &["mongosh"],
    max_connections: None,
    readiness_timeout_secs: 60,
    stop_grace_secs: 5,
};

static CLICKHOUSE: EngineDefaults = EngineDefaults {
    engine: Engine::ClickHouse,
    default_version: "25.5.2.47",
    latest_major: "25.5",
    default_port: 9000,
    port_range: (9000, 9100),
    superuser: Some("default"),
    scheme: "clickhouse",
    log_file: "clickhouse.log",
    pid_file: "clickhouse.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    server_binary: "clickhouse",
    client_tools: &["clickhouse"],
    max_connections: None,
    readiness_timeout_secs: 60,
    stop_grace_secs: 5,
};

static QDRANT: EngineDefaults = EngineDefaults {
    engine: Engine::Qdrant,
    default_version: "1.14.1",
    latest_major: "1",
    default_port: 6333,
    port_range: (6333, 6400),
    superuser: None,
    scheme: "http",
    log_file: "qdrant.log",
    pid_file: "qdrant.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "storage",
    server_binary: "qdrant",
    client_tools: &[],
    max_connections: None,
    readiness_timeout_secs: 30,
    stop_grace_secs: 2,
};

static MEILISEARCH: EngineDefaults = EngineDefaults {
    engine: Engine::Meilisearch,
    default_version: "1.15.2",
    latest_major: "1",
    default_port: 7700,
    port_range: (7700, 7800),
    superuser: None,
    scheme: "http",
    log_file: "meilisearch.log",
    pid_file: "meilisearch.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data.ms",
    server_binary: "meilisearch",
    client_tools: &[],
    max_connections: None,
    readiness_timeout_secs: 30,
    stop_grace_secs: 2,
};

static QUESTDB: EngineDefaults = EngineDefaults {
    engine: Engine::QuestDb,
    default_version: "8.3.1",
    latest_major: "8",
    default_port: 8812,
    port_range: (8812, 8900),
    superuser: Some("admin"),
    scheme: "postgresql",
    log_file: "questdb.log",
    pid_file: "questdb.pid",
    pid_location: PidFileLocation::ContainerDir,
    data_subdir: "data",
    // JVM launcher script; has no --version flag, and the daemon forks
    // away from it.
    server_binary: "questdb.sh",
    client_tools: &[],
    max_connections: None,
    readiness_timeout_secs: 120,
    stop_grace_secs: 5,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_engine_has_defaults() {
        for engine in Engine::ALL {
            let defaults = EngineDefaults::for_engine(engine);
            assert_eq!(defaults.engine, engine);
        }
    }

    #[test]
    fn server_based_engines_have_ports_and_logs() {
        for engine in Engine::ALL {
            let d = EngineDefaults::for_engine(engine);
            if engine.is_file_based() {
                assert_eq!(d.default_port, 0);
                assert!(d.log_file.is_empty());
            } else {
                assert!(d.default_port > 0);
                assert!(
                    d.port_range.0 <= d.default_port
                        && d.default_port <= d.port_range.1
                );
                assert!(!d.log_file.is_empty());
                assert!(!d.pid_file.is_empty());
            }
        }
    }

    #[test]
    fn only_postgres_resolves_pid_under_data() {
        for engine in Engine::ALL {
            let d = EngineDefaults::for_engine(engine);
            if engine == Engine::PostgreSql {
                assert_eq!(d.pid_location, PidFileLocation::DataDir);
            } else {
                assert_eq!(d.pid_location, PidFileLocation::ContainerDir);
            }
        }
    }
}
