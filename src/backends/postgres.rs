//! PostgreSQL driver
//!
//! A [`PostgresConnection`] connects with tokio-postgres on open and
//! disconnects on close. Named placeholders (`@id`, `:id`, `$id`) are
//! rewritten to positional `$n` parameters before the statement is prepared,
//! and each parameter's declared [`TypeTag`] becomes the statement's parameter
//! type where Postgres has a matching one.

use crate::core::{
    command::{Command, CommandKind},
    connection::{Connection, ConnectionFactory, ConnectionState, RowCursor},
    decimal::Decimal,
    error::{DatabaseError, Result},
    parameter::Parameter,
    type_tag::TypeTag,
    value::{DbRow, DbValue, Row},
};
use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use futures::StreamExt;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, RowStream, Statement};
use tracing::{trace, warn};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// PostgreSQL connection
pub struct PostgresConnection {
    connection_string: String,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl PostgresConnection {
    /// Create an unopened connection
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            client: None,
            driver: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))
    }

    /// Prepare the statement and line up its parameter values
    async fn prepare<'c>(&self, command: &'c Command) -> Result<(Statement, Vec<PgParam<'c>>)> {
        let client = self.client()?;
        let text = statement_text(command);
        let (sql, bound) = bind_positions(&text, command.parameters())?;
        let types: Vec<Type> = bound
            .iter()
            .map_while(|param| pg_type_for(param.type_tag()))
            .collect();

        let statement = client.prepare_typed(&sql, &types).await?;
        let values = bound.into_iter().map(|p| PgParam(p.value())).collect();
        Ok((statement, values))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn state(&self) -> ConnectionState {
        match &self.client {
            Some(client) if !client.is_closed() => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    async fn open(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Open {
            return Ok(());
        }
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls).await?;

        // The connection object performs the actual communication with the server
        self.driver = Some(tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection error");
            }
        }));
        self.client = Some(client);
        trace!("postgres connection opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // dropping the client ends the connection task
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver
                .await
                .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?;
            trace!("postgres connection closed");
        }
        Ok(())
    }

    fn close_now(&mut self) {
        self.client = None;
        self.driver = None;
    }

    async fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        let (statement, params) = self.prepare(command).await?;
        let affected = self
            .client()?
            .execute_raw(&statement, params.iter())
            .await?;
        Ok(i64::try_from(affected).unwrap_or(i64::MAX))
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<DbValue> {
        let (statement, params) = self.prepare(command).await?;
        if statement.columns().is_empty() {
            self.client()?.execute_raw(&statement, params.iter()).await?;
            return Ok(DbValue::Null);
        }
        let stream = self.client()?.query_raw(&statement, params.iter()).await?;
        let mut stream = Box::pin(stream);
        match stream.next().await {
            Some(row) => {
                let row = row?;
                decode_column(&row, 0)
            }
            None => Ok(DbValue::Null),
        }
    }

    async fn execute_reader(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let (statement, params) = self.prepare(command).await?;
        let columns: Arc<[String]> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let stream = self.client()?.query_raw(&statement, params.iter()).await?;

        Ok(Box::new(PostgresCursor {
            stream: Box::pin(stream),
            columns,
            current: None,
            empty: DbRow::new(Arc::from(Vec::new()), Vec::new()),
        }))
    }
}

struct PostgresCursor {
    stream: Pin<Box<RowStream>>,
    columns: Arc<[String]>,
    current: Option<DbRow>,
    empty: DbRow,
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn advance(&mut self) -> Result<bool> {
        self.current = None;
        match self.stream.next().await {
            Some(row) => {
                let row = row?;
                let mut values = Vec::with_capacity(self.columns.len());
                for idx in 0..self.columns.len() {
                    values.push(decode_column(&row, idx)?);
                }
                self.current = Some(DbRow::new(Arc::clone(&self.columns), values));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn row(&self) -> &dyn Row {
        match &self.current {
            Some(row) => row,
            None => &self.empty,
        }
    }
}

fn statement_text(command: &Command) -> Cow<'_, str> {
    match command.kind() {
        CommandKind::Text => Cow::Borrowed(command.text()),
        CommandKind::TableDirect => Cow::Owned(format!(
            "SELECT * FROM \"{}\"",
            command.text().replace('"', "\"\"")
        )),
        CommandKind::StoredProcedure => {
            let arguments: Vec<&str> = command.parameters().iter().map(|p| p.name()).collect();
            Cow::Owned(format!(
                "SELECT * FROM {}({})",
                command.text(),
                arguments.join(", ")
            ))
        }
    }
}

/// Parameter type Postgres should assume for a declared tag
fn pg_type_for(tag: TypeTag) -> Option<Type> {
    Some(match tag {
        TypeTag::Boolean => Type::BOOL,
        TypeTag::Byte | TypeTag::SByte | TypeTag::Int16 => Type::INT2,
        TypeTag::UInt16 | TypeTag::Int32 => Type::INT4,
        TypeTag::UInt32 | TypeTag::Int64 => Type::INT8,
        TypeTag::UInt64 | TypeTag::Decimal => Type::NUMERIC,
        TypeTag::Single => Type::FLOAT4,
        TypeTag::Double => Type::FLOAT8,
        TypeTag::DateTime => Type::TIMESTAMP,
        TypeTag::DateTimeOffset => Type::TIMESTAMPTZ,
        TypeTag::TimeSpan => Type::INTERVAL,
        TypeTag::Guid => Type::UUID,
        TypeTag::String => Type::TEXT,
        TypeTag::Binary => Type::BYTEA,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite named placeholders to `$1..$n`
///
/// Returns the parameters in position order. Placeholders inside string
/// literals, quoted identifiers, dollar-quoted bodies and comments are left
/// alone, as are names with no matching parameter. Every parameter must
/// appear in the text.
fn bind_positions<'c>(
    sql: &str,
    parameters: &'c [Parameter],
) -> Result<(String, Vec<&'c Parameter>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut bound: Vec<&Parameter> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let end = match c {
            '\'' | '"' => skip_quoted(&chars, i, c),
            '-' if next == Some('-') => skip_until(&chars, i + 2, &['\n']),
            '/' if next == Some('*') => skip_until(&chars, i + 2, &['*', '/']),
            '$' if next == Some('$') => skip_dollar_quoted(&chars, i, i + 1),
            '@' | ':' | '$'
                if next.is_some_and(is_ident_start) && !(c == ':' && i > 0 && chars[i - 1] == ':') =>
            {
                let mut j = i + 1;
                while j < chars.len() && is_ident_char(chars[j]) {
                    j += 1;
                }
                if c == '$' && chars.get(j) == Some(&'$') {
                    skip_dollar_quoted(&chars, i, j)
                } else {
                    let name: String = chars[i + 1..j].iter().collect();
                    match parameters.iter().find(|p| p.bare_name() == name) {
                        Some(param) => {
                            let position = match bound.iter().position(|b| std::ptr::eq(*b, param)) {
                                Some(existing) => existing + 1,
                                None => {
                                    bound.push(param);
                                    bound.len()
                                }
                            };
                            let _ = write!(out, "${}", position);
                            i = j;
                            continue;
                        }
                        None => j,
                    }
                }
            }
            _ => i + 1,
        };
        out.extend(&chars[i..end]);
        i = end;
    }

    if let Some(missing) = parameters
        .iter()
        .find(|p| !bound.iter().any(|b| std::ptr::eq(*b, *p)))
    {
        return Err(DatabaseError::query(format!(
            "parameter {} does not appear in the command text",
            missing.name()
        )));
    }
    Ok((out, bound))
}

/// End of a quoted run starting at `start`; a doubled quote is an escape
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn skip_until(chars: &[char], from: usize, terminator: &[char]) -> usize {
    let mut i = from;
    while i + terminator.len() <= chars.len() {
        if chars[i..i + terminator.len()] == *terminator {
            return i + terminator.len();
        }
        i += 1;
    }
    chars.len()
}

/// End of a `$tag$ ... $tag$` body whose opening tag spans `start..=tag_end`
fn skip_dollar_quoted(chars: &[char], start: usize, tag_end: usize) -> usize {
    let tag = &chars[start..=tag_end];
    skip_until(chars, tag_end + 1, tag)
}

/// Parameter value encoded for whatever type the server expects
#[derive(Debug)]
struct PgParam<'a>(&'a DbValue);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            DbValue::Null => Ok(IsNull::Yes),
            DbValue::Bool(v) => v.to_sql_checked(ty, out),
            DbValue::Byte(v) => encode_integer(*v as i64, ty, out),
            DbValue::SByte(v) => encode_integer(*v as i64, ty, out),
            DbValue::Int16(v) => encode_integer(*v as i64, ty, out),
            DbValue::UInt16(v) => encode_integer(*v as i64, ty, out),
            DbValue::Int32(v) => encode_integer(*v as i64, ty, out),
            DbValue::UInt32(v) => encode_integer(*v as i64, ty, out),
            DbValue::Int64(v) => encode_integer(*v, ty, out),
            DbValue::UInt64(v) => match i64::try_from(*v) {
                Ok(v) => encode_integer(v, ty, out),
                Err(_) => Decimal::new(*v as i128, 0)
                    .unwrap_or(Decimal::ZERO)
                    .to_sql_checked(ty, out),
            },
            DbValue::Single(v) if *ty == Type::FLOAT8 => (*v as f64).to_sql(ty, out),
            DbValue::Single(v) => v.to_sql_checked(ty, out),
            DbValue::Double(v) => v.to_sql_checked(ty, out),
            DbValue::Decimal(v) => v.to_sql_checked(ty, out),
            DbValue::DateTime(v) => v.to_sql_checked(ty, out),
            DbValue::DateTimeOffset(v) => v.to_sql_checked(ty, out),
            DbValue::TimeSpan(v) if *ty == Type::INTERVAL => {
                let micros = v
                    .num_microseconds()
                    .ok_or_else(|| BoxError::from("interval out of range"))?;
                out.put_i64(micros);
                out.put_i32(0);
                out.put_i32(0);
                Ok(IsNull::No)
            }
            DbValue::Guid(v) => v.to_sql_checked(ty, out),
            DbValue::String(v) => v.to_sql_checked(ty, out),
            DbValue::Binary(v) => v.to_sql_checked(ty, out),
            DbValue::Json(v) => v.to_sql_checked(ty, out),
            other => Err(format!("cannot encode {} as {}", other.type_name(), ty).into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Encode an integer at the width of the target column
fn encode_integer(v: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(v).to_sql(ty, out)
    } else {
        v.to_sql_checked(ty, out)
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;

// Binary `numeric`: ndigits, weight, sign, dscale, then base-10000 digits
impl ToSql for Decimal {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        let scale = self.scale();
        let pad = (4 - scale % 4) % 4;
        let mut magnitude = self
            .mantissa()
            .unsigned_abs()
            .checked_mul(10u128.pow(pad))
            .ok_or_else(|| BoxError::from("decimal out of numeric range"))?;

        let mut groups = Vec::new();
        while magnitude > 0 {
            groups.push((magnitude % 10_000) as i16);
            magnitude /= 10_000;
        }
        groups.reverse();
        let weight = groups.len() as i32 - ((scale + pad) / 4) as i32 - 1;
        while groups.last() == Some(&0) {
            groups.pop();
        }

        out.put_i16(groups.len() as i16);
        out.put_i16(if groups.is_empty() { 0 } else { weight as i16 });
        out.put_u16(if self.is_negative() { NUMERIC_NEG } else { NUMERIC_POS });
        out.put_u16(scale as u16);
        for group in groups {
            out.put_i16(group);
        }
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Decimal {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        if raw.remaining() < 8 {
            return Err("truncated numeric value".into());
        }
        let ndigits = raw.get_i16();
        let weight = raw.get_i16() as i32;
        let sign = raw.get_u16();
        let dscale = raw.get_u16() as u32;
        if sign != NUMERIC_POS && sign != NUMERIC_NEG {
            return Err("NaN and infinite numerics have no decimal representation".into());
        }
        if raw.remaining() < ndigits.max(0) as usize * 2 {
            return Err("truncated numeric value".into());
        }

        let overflow = || BoxError::from("numeric value out of decimal range");
        let mut mantissa: i128 = 0;
        for i in 0..ndigits.max(0) as i32 {
            let digit = raw.get_i16() as i128;
            let exponent = 4 * (weight - i) + dscale as i32;
            let term = if exponent >= 0 {
                10i128
                    .checked_pow(exponent as u32)
                    .and_then(|p| digit.checked_mul(p))
                    .ok_or_else(overflow)?
            } else {
                10i128
                    .checked_pow(exponent.unsigned_abs())
                    .map_or(0, |p| digit / p)
            };
            mantissa = mantissa.checked_add(term).ok_or_else(overflow)?;
        }
        if sign == NUMERIC_NEG {
            mantissa = -mantissa;
        }
        Decimal::new(mantissa, dscale).ok_or_else(|| BoxError::from("numeric scale exceeds 28"))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// `interval` read as an exact span; a month counts as 30 days
struct PgInterval(TimeDelta);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        if raw.remaining() != 16 {
            return Err("invalid interval value".into());
        }
        let micros = raw.get_i64();
        let days = raw.get_i32() as i64 + raw.get_i32() as i64 * 30;
        Ok(PgInterval(
            TimeDelta::microseconds(micros) + TimeDelta::days(days),
        ))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn decode_column(row: &tokio_postgres::Row, idx: usize) -> Result<DbValue> {
    fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
        Ok(row.try_get::<_, Option<T>>(idx)?)
    }

    let column = &row.columns()[idx];
    let ty = column.type_();
    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx)?.map(DbValue::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx)?.map(DbValue::Int16)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx)?.map(DbValue::Int32)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx)?.map(DbValue::Int64)
    } else if *ty == Type::OID {
        get::<u32>(row, idx)?.map(DbValue::UInt32)
    } else if *ty == Type::CHAR {
        get::<i8>(row, idx)?.map(DbValue::SByte)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx)?.map(DbValue::Single)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx)?.map(DbValue::Double)
    } else if *ty == Type::NUMERIC {
        get::<Decimal>(row, idx)?.map(DbValue::Decimal)
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row, idx)?.map(DbValue::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<FixedOffset>>(row, idx)?.map(DbValue::DateTimeOffset)
    } else if *ty == Type::DATE {
        get::<NaiveDate>(row, idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(DbValue::DateTime)
    } else if *ty == Type::INTERVAL {
        get::<PgInterval>(row, idx)?.map(|i| DbValue::TimeSpan(i.0))
    } else if *ty == Type::UUID {
        get::<Uuid>(row, idx)?.map(DbValue::Guid)
    } else if *ty == Type::BYTEA {
        get::<Vec<u8>>(row, idx)?.map(DbValue::Binary)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<serde_json::Value>(row, idx)?.map(DbValue::Json)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty) {
        get::<String>(row, idx)?.map(DbValue::String)
    } else {
        return Err(DatabaseError::UnsupportedColumnType {
            column: column.name().to_string(),
            type_name: ty.name().to_string(),
        });
    };
    Ok(value.unwrap_or(DbValue::Null))
}

/// Creates [`PostgresConnection`]s for one server
#[derive(Debug, Clone)]
pub struct PostgresConnectionFactory {
    connection_string: String,
}

impl PostgresConnectionFactory {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

impl ConnectionFactory for PostgresConnectionFactory {
    type Connection = PostgresConnection;

    fn create(&self) -> Result<PostgresConnection> {
        Ok(PostgresConnection::new(self.connection_string.clone()))
    }
}
