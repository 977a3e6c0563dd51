//! A single tiberius connection implementing the loader's capabilities.

use crate::config::MssqlConfig;
use crate::error::MssqlError;
use crate::values::column_data;
use async_trait::async_trait;
use sqlimport_core::{ColumnSpec, MaxLength, SqlType, SqlValue, TableName};
use sqlimport_loader::{BulkCopy, BulkCopyOptions, Database};
use std::collections::{HashMap, HashSet};
use tiberius::{Client, ColumnData, Row, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

type TdsClient = Client<Compat<TcpStream>>;

/// Catalog facts the bulk-copy path needs beyond [`ColumnSpec`].
#[derive(Debug, Default, Clone)]
struct TableMeta {
    /// Identity and computed columns, lowercased. The bulk-copy stream
    /// never carries them.
    readonly: HashSet<String>,
    /// Declared scale of decimal/numeric columns, keyed by lowercased name
    scales: HashMap<String, u8>,
}

pub struct MssqlConnection {
    client: TdsClient,
    meta: HashMap<String, TableMeta>,
    hints_logged: bool,
}

impl MssqlConnection {
    pub async fn connect(config: &MssqlConfig) -> Result<Self, MssqlError> {
        info!(
            "Connecting to SQL Server at {} (database: {})",
            config.addr(),
            config.database.as_deref().unwrap_or("<default>")
        );
        let client = open(config.to_tiberius()?).await?;
        Ok(Self {
            client,
            meta: HashMap::new(),
            hints_logged: false,
        })
    }

    async fn run(&mut self, sql: &str) -> Result<u64, MssqlError> {
        debug!("execute: {}", sql);
        // SET options issued through sp_executesql only last for that call.
        if is_session_setting(sql) {
            self.client.simple_query(sql).await?.into_results().await?;
            return Ok(0);
        }
        let result = self.client.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn scalar(&mut self, sql: &str) -> Result<Option<i64>, MssqlError> {
        debug!("scalar: {}", sql);
        let row = self.client.query(sql, &[]).await?.into_row().await?;
        match row.and_then(|r| r.into_iter().next()) {
            Some(value) => integer(value),
            None => Ok(None),
        }
    }

    async fn columns(&mut self, table: &TableName) -> Result<Vec<ColumnSpec>, MssqlError> {
        let sql = catalog_query(table);
        debug!("catalog lookup for {}", table);
        let rows = match &table.schema {
            Some(schema) => {
                self.client
                    .query(sql, &[&schema.as_str(), &table.name.as_str()])
                    .await?
                    .into_first_result()
                    .await?
            }
            None => {
                self.client
                    .query(sql, &[&table.name.as_str()])
                    .await?
                    .into_first_result()
                    .await?
            }
        };

        let mut columns = Vec::with_capacity(rows.len());
        let mut meta = TableMeta::default();
        for row in &rows {
            let (column, readonly, scale) = catalog_row(row)?;
            let key = column.name.to_lowercase();
            if readonly {
                meta.readonly.insert(key.clone());
            }
            if let Some(scale) = scale {
                meta.scales.insert(key, scale);
            }
            columns.push(column);
        }
        self.meta.insert(table.quoted(), meta);
        Ok(columns)
    }

    async fn bulk_write(
        &mut self,
        table: &TableName,
        columns: &[ColumnSpec],
        rows: Vec<Vec<SqlValue>>,
        options: &BulkCopyOptions,
    ) -> Result<u64, MssqlError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.log_unsupported_hints(options);

        let quoted = table.quoted();
        if !self.meta.contains_key(&quoted) {
            self.columns(table).await?;
        }
        let meta = self.meta.get(&quoted).cloned().unwrap_or_default();

        let layout: Vec<(bool, SqlType, Option<u8>)> = columns
            .iter()
            .map(|c| {
                let key = c.name.to_lowercase();
                (
                    meta.readonly.contains(&key),
                    c.sql_type,
                    meta.scales.get(&key).copied(),
                )
            })
            .collect();

        let mut token_rows = Vec::with_capacity(rows.len());
        for values in rows {
            let mut token_row = TokenRow::new();
            for (value, (readonly, sql_type, scale)) in values.into_iter().zip(&layout) {
                if *readonly {
                    continue;
                }
                token_row.push(column_data(value, *sql_type, *scale)?);
            }
            token_rows.push(token_row);
        }

        let count = token_rows.len();
        let send = async {
            let mut request = self.client.bulk_insert(&quoted).await?;
            for row in token_rows {
                request.send(row).await?;
            }
            let result = request.finalize().await?;
            Ok::<u64, MssqlError>(result.total())
        };
        let total = match tokio::time::timeout(options.timeout, send).await {
            Ok(result) => result?,
            Err(_) => return Err(MssqlError::Timeout(options.timeout.as_secs())),
        };
        debug!("bulk copy sent {} rows, server reported {}", count, total);
        Ok(total)
    }

    fn log_unsupported_hints(&mut self, options: &BulkCopyOptions) {
        if self.hints_logged {
            return;
        }
        self.hints_logged = true;
        if options.table_lock || options.check_constraints || options.keep_identity {
            warn!(
                "Bulk copy over TDS ignores table lock, constraint check and identity hints; \
                 use the server-staged strategy to apply them"
            );
        }
    }
}

async fn open(config: tiberius::Config) -> Result<TdsClient, MssqlError> {
    let tcp = tcp_connect(&config).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL may redirect the login to another node.
        Err(tiberius::error::Error::Routing { host, port }) => {
            info!("Login redirected to {}:{}", host, port);
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = tcp_connect(&config).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn tcp_connect(config: &tiberius::Config) -> Result<TcpStream, MssqlError> {
    let addr = config.get_addr();
    let connect_error = |source| {
        let (host, port) = addr.rsplit_once(':').unwrap_or((addr.as_str(), ""));
        MssqlError::Connect {
            host: host.to_string(),
            port: port.parse().unwrap_or_default(),
            source,
        }
    };
    let tcp = TcpStream::connect(&addr).await.map_err(connect_error)?;
    tcp.set_nodelay(true).map_err(connect_error)?;
    Ok(tcp)
}

fn is_session_setting(sql: &str) -> bool {
    sql.trim_start()
        .get(..4)
        .map_or(false, |head| head.eq_ignore_ascii_case("SET "))
}

fn integer(value: ColumnData<'static>) -> Result<Option<i64>, MssqlError> {
    let out = match value {
        ColumnData::I64(v) => v,
        ColumnData::I32(v) => v.map(i64::from),
        ColumnData::I16(v) => v.map(i64::from),
        ColumnData::U8(v) => v.map(i64::from),
        ColumnData::Bit(v) => v.map(i64::from),
        ColumnData::Numeric(v) => match v {
            Some(n) => Some(
                i64::try_from(n.int_part())
                    .map_err(|_| MssqlError::Value(format!("{} does not fit in bigint", n)))?,
            ),
            None => None,
        },
        other => {
            return Err(MssqlError::Value(format!(
                "expected an integer result, got {:?}",
                other
            )))
        }
    };
    Ok(out)
}

/// Columns of one table with the identity/computed flags and numeric scale.
///
/// `@P1` is the schema when one is given; otherwise the caller's default
/// schema is used and the table name moves to `@P1`.
fn catalog_query(table: &TableName) -> String {
    let prefix = table
        .database
        .as_deref()
        .map(|db| format!("{}.", sqlimport_core::types::quote_identifier(db)))
        .unwrap_or_default();
    let (schema_filter, name_param) = match table.schema {
        Some(_) => ("@P1", "@P2"),
        None => ("SCHEMA_NAME()", "@P1"),
    };
    format!(
        "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.CHARACTER_MAXIMUM_LENGTH, c.ORDINAL_POSITION, c.NUMERIC_SCALE,\n\
         COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_CATALOG) + '.' + QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity') AS is_identity,\n\
         COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_CATALOG) + '.' + QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsComputed') AS is_computed\n\
         FROM {prefix}INFORMATION_SCHEMA.COLUMNS AS c\n\
         WHERE c.TABLE_SCHEMA = {schema_filter} AND c.TABLE_NAME = {name_param}\n\
         ORDER BY c.ORDINAL_POSITION",
    )
}

fn catalog_row(row: &Row) -> Result<(ColumnSpec, bool, Option<u8>), MssqlError> {
    let missing = |what: &str| MssqlError::Value(format!("catalog row without {}", what));
    let name: &str = row.try_get(0)?.ok_or_else(|| missing("COLUMN_NAME"))?;
    let type_name: &str = row.try_get(1)?.ok_or_else(|| missing("DATA_TYPE"))?;
    let max_length: Option<i32> = row.try_get(2)?;
    let ordinal: i32 = row.try_get(3)?.ok_or_else(|| missing("ORDINAL_POSITION"))?;
    let scale: Option<i32> = row.try_get(4)?;
    let is_identity: Option<i32> = row.try_get(5)?;
    let is_computed: Option<i32> = row.try_get(6)?;

    let column = ColumnSpec::new(
        u32::try_from(ordinal).unwrap_or_default(),
        name,
        type_name,
        MaxLength::from_catalog(max_length.map(i64::from)),
    );
    let readonly = is_identity == Some(1) || is_computed == Some(1);
    let scale = match column.sql_type {
        SqlType::Decimal | SqlType::Numeric => scale.and_then(|s| u8::try_from(s).ok()),
        _ => None,
    };
    Ok((column, readonly, scale))
}

#[async_trait]
impl Database for MssqlConnection {
    async fn execute(&mut self, sql: &str) -> sqlimport_core::Result<u64> {
        Ok(self.run(sql).await?)
    }

    async fn execute_scalar(&mut self, sql: &str) -> sqlimport_core::Result<Option<i64>> {
        Ok(self.scalar(sql).await?)
    }

    async fn table_columns(&mut self, table: &TableName) -> sqlimport_core::Result<Vec<ColumnSpec>> {
        Ok(self.columns(table).await?)
    }
}

#[async_trait]
impl BulkCopy for MssqlConnection {
    async fn write_batch(
        &mut self,
        table: &TableName,
        columns: &[ColumnSpec],
        rows: Vec<Vec<SqlValue>>,
        options: &BulkCopyOptions,
    ) -> sqlimport_core::Result<u64> {
        Ok(self.bulk_write(table, columns, rows, options).await?)
    }
}
