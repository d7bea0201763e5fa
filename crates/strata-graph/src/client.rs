//! Neo4j connection management and the transaction orchestrator.
//!
//! Every store operation runs as one unit of work inside a managed
//! transaction: [`GraphClient::run_read`] and [`GraphClient::run_write`] open the
//! transaction, hand it to the work closure, commit (or roll back), and
//! repeat the whole unit on transient failures.

use std::future::Future;

use futures::future::BoxFuture;
use neo4rs::{BoltMap, BoltString, BoltType, ConfigBuilder, Graph, Query, Row, Txn};

use strata_core::config::{GraphSettings, RetrySettings, UniquenessMode};
use strata_core::{PropertyValue, StrataError};

use crate::cypher::{self, Param, Statement};
use crate::retry::{self, ErrorClass, RetryPolicy};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A domain rule rejected the work inside the transaction.
    #[error(transparent)]
    Rejected(#[from] StrataError),

    #[error("Store unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },
}

impl GraphError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection(_) => ErrorClass::Transient,
            Self::Query(e) => retry::classify(&e.to_string()),
            Self::Serialization(_) | Self::Rejected(_) | Self::Unavailable { .. } => {
                ErrorClass::Permanent
            }
        }
    }

    /// Map a constraint violation to `on_conflict`, anything else as usual.
    pub fn into_strata_or(self, on_conflict: impl FnOnce() -> StrataError) -> StrataError {
        if self.class() == ErrorClass::Constraint {
            on_conflict()
        } else {
            self.into()
        }
    }
}

impl From<GraphError> for StrataError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Rejected(e) => e,
            GraphError::Unavailable { attempts, .. } => StrataError::StoreUnavailable { attempts },
            other => StrataError::internal(other),
        }
    }
}

/// Whether a unit of work is committed or only read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
    pub uniqueness: UniquenessMode,
    pub retry: RetryPolicy,
}

impl GraphConfig {
    pub fn from_settings(graph: &GraphSettings, retry: &RetrySettings) -> Self {
        Self {
            uri: graph.uri.clone(),
            user: graph.user.clone(),
            password: graph.password.clone(),
            max_connections: graph.max_connections,
            fetch_size: graph.fetch_size,
            uniqueness: graph.uniqueness,
            retry: RetryPolicy::from(retry),
        }
    }
}

/// Boxed unit of work borrowing the open transaction.
pub type TxnFuture<'t, T> = BoxFuture<'t, Result<T, GraphError>>;

/// Box a unit of work for [`GraphClient::run_read`] or [`GraphClient::run_write`].
pub fn txn_work<'t, T, Fut>(work: Fut) -> TxnFuture<'t, T>
where
    Fut: Future<Output = Result<T, GraphError>> + Send + 't,
{
    Box::pin(work)
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// The only component that talks to the store. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    retry: RetryPolicy,
    uniqueness: UniquenessMode,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self {
            graph,
            retry: config.retry.clone(),
            uniqueness: config.uniqueness,
        })
    }

    pub fn uniqueness(&self) -> UniquenessMode {
        self.uniqueness
    }

    /// Install constraints and indexes on the schema entities. Idempotent.
    pub async fn bootstrap(&self) -> Result<(), GraphError> {
        let statements = cypher::bootstrap(self.uniqueness);
        self.run_write("bootstrap", move |txn| {
            let statements = statements.clone();
            txn_work(async move {
                for stmt in statements {
                    exec(txn, stmt).await?;
                }
                Ok(())
            })
        })
        .await?;
        tracing::info!("Schema constraints in place");
        Ok(())
    }

    /// Run a read-only unit of work. The transaction is never committed.
    pub async fn run_read<T, F>(&self, op: &'static str, work: F) -> Result<T, GraphError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut Txn) -> TxnFuture<'t, T> + Send + Sync,
    {
        self.retry
            .run(op, || self.attempt(op, AccessMode::Read, &work))
            .await
    }

    /// Run a unit of work and commit it. Nothing is applied on failure.
    pub async fn run_write<T, F>(&self, op: &'static str, work: F) -> Result<T, GraphError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut Txn) -> TxnFuture<'t, T> + Send + Sync,
    {
        self.retry
            .run(op, || self.attempt(op, AccessMode::Write, &work))
            .await
    }

    async fn attempt<T, F>(
        &self,
        op: &'static str,
        mode: AccessMode,
        work: &F,
    ) -> Result<T, GraphError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut Txn) -> TxnFuture<'t, T> + Send + Sync,
    {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        match work(&mut txn).await {
            Ok(value) => {
                match mode {
                    AccessMode::Write => txn.commit().await?,
                    AccessMode::Read => txn.rollback().await?,
                }
                tracing::debug!(op, ?mode, "Transaction finished");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(op, error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

// ── Statement execution inside a transaction ─────────────────────

fn bolt(param: Param) -> BoltType {
    match param {
        Param::String(s) => BoltType::from(s),
        Param::Integer(i) => BoltType::from(i),
        Param::Float(f) => BoltType::from(f),
        Param::Boolean(b) => BoltType::from(b),
        Param::Strings(v) => BoltType::from(v),
        Param::Map(props) => {
            let mut map = BoltMap::new();
            for (k, v) in props {
                let value = match v {
                    PropertyValue::String(s) => BoltType::from(s),
                    PropertyValue::Integer(i) => BoltType::from(i),
                    PropertyValue::Float(f) => BoltType::from(f),
                    PropertyValue::Boolean(b) => BoltType::from(b),
                };
                map.put(BoltString::from(k.as_str()), value);
            }
            BoltType::Map(map)
        }
    }
}

impl Statement {
    pub fn into_query(self) -> Query {
        let mut query = neo4rs::query(&self.text);
        for (key, value) in self.params {
            query = query.param(&key, bolt(value));
        }
        query
    }
}

/// Run a statement, discarding any rows.
pub(crate) async fn exec(txn: &mut Txn, stmt: Statement) -> Result<(), GraphError> {
    txn.run(stmt.into_query()).await?;
    Ok(())
}

/// Run a statement and collect every row.
pub(crate) async fn fetch_all(txn: &mut Txn, stmt: Statement) -> Result<Vec<Row>, GraphError> {
    let mut stream = txn.execute(stmt.into_query()).await?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        rows.push(row);
    }
    Ok(rows)
}

pub(crate) async fn fetch_one(txn: &mut Txn, stmt: Statement) -> Result<Option<Row>, GraphError> {
    Ok(fetch_all(txn, stmt).await?.into_iter().next())
}

/// Run a `RETURN count(..) AS cnt` statement.
pub(crate) async fn count(txn: &mut Txn, stmt: Statement) -> Result<i64, GraphError> {
    match fetch_one(txn, stmt).await? {
        Some(row) => count_from_row(&row),
        None => Ok(0),
    }
}

/// An undecodable count is an error, never zero: in-use checks rely on it.
fn count_from_row(row: &Row) -> Result<i64, GraphError> {
    row.get::<i64>("cnt")
        .map_err(|e| GraphError::Serialization(format!("column cnt: {e}")))
}
