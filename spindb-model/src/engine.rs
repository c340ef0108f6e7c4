use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpinError;

/// The closed set of database engines SpinDB can manage.
///
/// Serialized as the lowercase identifier used in directory names,
/// `container.json`, and the binary registry catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    PostgreSql,
    MySql,
    MariaDb,
    Sqlite,
    DuckDb,
    Redis,
    Valkey,
    MongoDb,
    FerretDb,
    ClickHouse,
    Qdrant,
    Meilisearch,
    QuestDb,
}

impl Engine {
    /// Every engine, in catalog order.
    pub const ALL: [Engine; 13] = [
        Engine::PostgreSql,
        Engine::MySql,
        Engine::MariaDb,
        Engine::Sqlite,
        Engine::DuckDb,
        Engine::Redis,
        Engine::Valkey,
        Engine::MongoDb,
        Engine::FerretDb,
        Engine::ClickHouse,
        Engine::Qdrant,
        Engine::Meilisearch,
        Engine::QuestDb,
    ];

    /// The lowercase identifier used on disk and in the registry.
    pub const fn id(self) -> &'static str {
        match self {
            Engine::PostgreSql => "postgresql",
            Engine::MySql => "mysql",
            Engine::MariaDb => "mariadb",
            Engine::Sqlite => "sqlite",
            Engine::DuckDb => "duckdb",
            Engine::Redis => "redis",
            Engine::Valkey => "valkey",
            Engine::MongoDb => "mongodb",
            Engine::FerretDb => "ferretdb",
            Engine::ClickHouse => "clickhouse",
            Engine::Qdrant => "qdrant",
            Engine::Meilisearch => "meilisearch",
            Engine::QuestDb => "questdb",
        }
    }

    /// File-based engines have no server process or TCP port; the file
    /// is the database.
    pub const fn is_file_based(self) -> bool {
        matches!(self, Engine::Sqlite | Engine::DuckDb)
    }

    /// Engines that manage multiple logical databases per instance.
    ///
    /// Redis and Valkey expose numbered databases, so create/drop are
    /// accepted but no-op. Single-database engines reject extra names.
    pub const fn supports_multiple_databases(self) -> bool {
        matches!(
            self,
            Engine::PostgreSql
                | Engine::MySql
                | Engine::MariaDb
                | Engine::MongoDb
                | Engine::FerretDb
                | Engine::ClickHouse
        )
    }

    /// Engines whose version strings are date-style (`YY.M.patch.build`);
    /// their "major" is the first two components.
    pub const fn has_date_style_versions(self) -> bool {
        matches!(self, Engine::ClickHouse)
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Engine {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Engine::PostgreSql),
            "mysql" => Ok(Engine::MySql),
            "mariadb" => Ok(Engine::MariaDb),
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            "duckdb" => Ok(Engine::DuckDb),
            "redis" => Ok(Engine::Redis),
            "valkey" => Ok(Engine::Valkey),
            "mongodb" | "mongo" => Ok(Engine::MongoDb),
            "ferretdb" | "ferret" => Ok(Engine::FerretDb),
            "clickhouse" => Ok(Engine::ClickHouse),
            "qdrant" => Ok(Engine::Qdrant),
            "meilisearch" | "meili" => Ok(Engine::Meilisearch),
            "questdb" => Ok(Engine::QuestDb),
            other => Err(SpinError::UnknownEngine {
                engine: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_from_str() {
        for engine in Engine::ALL {
            let parsed: Engine = engine.id().parse().unwrap();
            assert_eq!(parsed, engine);
        }
    }

    #[test]
    fn aliases_parse() {
        assert_eq!("pg".parse::<Engine>().unwrap(), Engine::PostgreSql);
        assert_eq!("mongo".parse::<Engine>().unwrap(), Engine::MongoDb);
        assert_eq!("sqlite3".parse::<Engine>().unwrap(), Engine::Sqlite);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        assert!("oracle".parse::<Engine>().is_err());
    }

    #[test]
    fn file_based_partition() {
        assert!(Engine::Sqlite.is_file_based());
        assert!(Engine::DuckDb.is_file_based());
        assert!(!Engine::PostgreSql.is_file_based());
        assert!(!Engine::Qdrant.is_file_based());
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        let json = serde_json::to_string(&Engine::PostgreSql).unwrap();
        assert_eq!(json, "\"postgresql\"");
        let engine: Engine = serde_json::from_str("\"clickhouse\"").unwrap();
        assert_eq!(engine, Engine::ClickHouse);
    }
}
