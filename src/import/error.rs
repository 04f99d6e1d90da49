use sea_orm::DbErr;

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tsv error: {0}")]
    Tsv(#[from] csv::Error),
    #[error("missing column {0}")]
    MissingColumn(String),
    #[error("line {line}: invalid {column} {value:?}")]
    Malformed {
        line: u64,
        column: &'static str,
        value: String,
    },
    #[error("unknown {kind} {id}")]
    UnknownReference { kind: &'static str, id: i64 },
    #[error("no demand segment for user type {0:?}")]
    UnknownUserType(String),
    #[error("simulation {0} has no {1}")]
    MissingContainer(i32, &'static str),
}

impl ImportError {
    pub fn malformed(line: u64, column: &'static str, value: &str) -> Self {
        ImportError::Malformed {
            line,
            column,
            value: value.to_string(),
        }
    }
}
