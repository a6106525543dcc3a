//! Insert pipelines: one-shot block inserts and the row-based bulk
//! inserter.
//!
//! The wire choreography is the same for both: send the INSERT query,
//! send an empty data block, receive the server's schema block (column
//! names and types in server order), stream data blocks, and finish with
//! a terminal empty block. The server applies nothing until the terminal
//! block arrives, so a failed insert leaves no partial rows.

use crate::{
    block::Block,
    client::{
        Client,
        ConnectionState,
        ServerMessage,
    },
    column::{
        column_value::{
            append_column_item,
            ColumnValue,
        },
        Column,
        ColumnLowCardinality,
        ColumnRef,
    },
    io::block_stream::create_column,
    protocol::ClientCode,
    types::Type,
    Error,
    Result,
};
use std::sync::Arc;

/// A user type insertable row-by-row through the bulk pipeline.
///
/// `column_names` declares the columns in the type's own order;
/// `to_row` extracts one row of values under those names. The inserter
/// reorders values into the server's schema order by name.
pub trait Row {
    /// Column names in declaration order.
    fn column_names() -> Vec<&'static str>;

    /// The values of one row, paired with their column names.
    fn to_row(&self) -> Result<Vec<(&'static str, ColumnValue)>>;
}

// Bulk extraction covers scalars, Nullable(scalar) and
// LowCardinality thereof; composite cells need a per-cell policy this
// pipeline does not define.
fn check_insertable(name: &str, type_: &Type) -> Result<()> {
    let inner = match type_ {
        Type::LowCardinality { nested_type } => nested_type.as_ref(),
        other => other,
    };
    let scalar = match inner {
        Type::Nullable { nested_type } => nested_type.as_ref(),
        other => other,
    };

    let supported = !(scalar.is_array()
        || scalar.is_map()
        || scalar.is_tuple()
        || scalar.is_nested()
        || scalar.is_nullable()
        || scalar.is_json()
        || scalar.is_low_cardinality());

    if supported {
        Ok(())
    } else {
        Err(Error::UnsupportedBulkInsertColumn(format!(
            "{} {}",
            name,
            type_.name()
        )))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

impl Client {
    /// Insert one prepared block into a table.
    pub async fn insert(&mut self, table: &str, block: Block) -> Result<()> {
        if block.column_count() == 0 {
            return Err(Error::InvalidArgument(
                "insert block has no columns".to_string(),
            ));
        }

        let columns: Vec<String> = (0..block.column_count())
            .filter_map(|i| block.column_name(i))
            .map(quote_identifier)
            .collect();
        let text = format!(
            "INSERT INTO {} ({}) VALUES",
            table,
            columns.join(", ")
        );

        self.ensure_ready()?;
        let query = crate::query::Query::new(text);
        self.send_query(&query).await.map_err(|e| {
            self.close();
            e
        })?;
        self.state = ConnectionState::QueryActive;

        self.request_schema().await?;

        self.write_data_block(&block).await?;
        self.write_data_block(&Block::new()).await?;
        self.conn.flush().await?;

        self.await_end_of_insert().await
    }

    /// Begin a row-based bulk insert into a table.
    ///
    /// Negotiates the target schema, then buffers rows of `R` into
    /// columnar blocks of `insert_batch_size` rows each. The insert
    /// becomes visible only after [`BulkInserter::complete`].
    pub async fn bulk_insert<R: Row>(
        &mut self,
        table: &str,
    ) -> Result<BulkInserter<'_, R>> {
        let field_names = R::column_names();
        let columns: Vec<String> =
            field_names.iter().map(|n| quote_identifier(n)).collect();
        let text = format!(
            "INSERT INTO {} ({}) VALUES",
            table,
            columns.join(", ")
        );

        self.ensure_ready()?;
        let query = crate::query::Query::new(text);
        self.send_query(&query).await.map_err(|e| {
            self.close();
            e
        })?;
        self.state = ConnectionState::QueryActive;

        let schema_block = self.request_schema().await?;

        let mut schema = Vec::new();
        let mut field_order = Vec::new();
        for i in 0..schema_block.column_count() {
            let name = schema_block
                .column_name(i)
                .expect("column index in bounds")
                .to_string();
            let type_ = schema_block
                .column(i)
                .expect("column index in bounds")
                .column_type()
                .clone();

            check_insertable(&name, &type_)?;

            let field = field_names
                .iter()
                .position(|n| *n == name)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "server schema column '{}' has no field in the row \
                         type",
                        name
                    ))
                })?;
            field_order.push(field);
            schema.push((name, type_));
        }

        let builders = new_builders(&schema)?;
        let batch_size = self.options.insert_batch_size.max(1);

        Ok(BulkInserter {
            client: self,
            schema,
            field_order,
            builders,
            rows_buffered: 0,
            batch_size,
            _row: std::marker::PhantomData,
        })
    }

    // Send the empty block that asks for the target schema, then read
    // messages until the schema block arrives.
    async fn request_schema(&mut self) -> Result<Block> {
        self.write_data_block(&Block::new()).await?;
        self.conn.flush().await?;

        loop {
            match self.receive_message().await {
                Ok(ServerMessage::Data(block)) => {
                    tracing::debug!(
                        columns = block.column_count(),
                        "received insert schema"
                    );
                    return Ok(block);
                }
                Ok(ServerMessage::Progress(_))
                | Ok(ServerMessage::TableColumns(_))
                | Ok(ServerMessage::Log(_))
                | Ok(ServerMessage::ProfileEvents(_)) => continue,
                Ok(_) => {
                    self.close();
                    return Err(Error::MalformedWire(
                        "unexpected packet while waiting for insert schema"
                            .to_string(),
                    ));
                }
                Err(Error::Server(e)) => {
                    self.state = ConnectionState::Ready;
                    return Err(Error::Server(e));
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }

    pub(crate) async fn write_data_block(
        &mut self,
        block: &Block,
    ) -> Result<()> {
        self.conn.write_varint(ClientCode::Data as u64).await?;
        self.writer.write_block(&mut self.conn, block).await
    }

    pub(crate) async fn await_end_of_insert(&mut self) -> Result<()> {
        loop {
            match self.receive_message().await {
                Ok(ServerMessage::EndOfStream) => {
                    self.state = ConnectionState::Ready;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(Error::Server(e)) => {
                    self.state = ConnectionState::Ready;
                    return Err(Error::Server(e));
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }
}

fn new_builders(schema: &[(String, Type)]) -> Result<Vec<ColumnRef>> {
    schema.iter().map(|(_, type_)| create_column(type_)).collect()
}

/// Accumulates rows into columnar blocks and streams them to the server.
pub struct BulkInserter<'a, R: Row> {
    client: &'a mut Client,
    schema: Vec<(String, Type)>,
    // schema position -> index into the row's value list.
    field_order: Vec<usize>,
    builders: Vec<ColumnRef>,
    rows_buffered: usize,
    batch_size: usize,
    _row: std::marker::PhantomData<fn(&R)>,
}

impl<R: Row> std::fmt::Debug for BulkInserter<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkInserter")
            .field("schema", &self.schema)
            .field("rows_buffered", &self.rows_buffered)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl<R: Row> BulkInserter<'_, R> {
    /// The negotiated target schema in server order.
    pub fn schema(&self) -> &[(String, Type)] {
        &self.schema
    }

    /// Rows currently buffered, not yet sent.
    pub fn buffered_rows(&self) -> usize {
        self.rows_buffered
    }

    /// Buffer one row, flushing a block when the batch threshold is
    /// reached.
    pub async fn write(&mut self, row: &R) -> Result<()> {
        let values = row.to_row()?;

        for (position, builder) in self.builders.iter_mut().enumerate() {
            let field = self.field_order[position];
            let (_, value) = values.get(field).ok_or_else(|| {
                Error::Validation(format!(
                    "row value {} missing for column '{}'",
                    field, self.schema[position].0
                ))
            })?;

            let column = Arc::get_mut(builder)
                .expect("builders are unshared between flushes");
            if let Some(lc) =
                column.as_any_mut().downcast_mut::<ColumnLowCardinality>()
            {
                lc.append(value)?;
            } else {
                append_column_item(column, value)?;
            }
        }

        self.rows_buffered += 1;
        if self.rows_buffered >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the buffered rows as one data block and reset the
    /// accumulator.
    pub async fn flush(&mut self) -> Result<()> {
        if self.rows_buffered == 0 {
            return Ok(());
        }

        let builders =
            std::mem::replace(&mut self.builders, new_builders(&self.schema)?);

        let mut block = Block::new();
        for ((name, _), column) in self.schema.iter().zip(builders) {
            block.append_column(name.clone(), column)?;
        }

        tracing::debug!(rows = block.row_count(), "flushing insert block");
        let result = async {
            self.client.write_data_block(&block).await?;
            self.client.conn.flush().await
        }
        .await;

        if let Err(e) = result {
            self.client.close();
            return Err(e);
        }

        self.rows_buffered = 0;
        Ok(())
    }

    /// Flush residual rows, send the terminal empty block, and wait for
    /// the server to acknowledge the whole insert.
    pub async fn complete(mut self) -> Result<()> {
        self.flush().await?;

        let result = async {
            self.client.write_data_block(&Block::new()).await?;
            self.client.conn.flush().await
        }
        .await;
        if let Err(e) = result {
            self.client.close();
            return Err(e);
        }

        self.client.await_end_of_insert().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertable_column_check() {
        assert!(check_insertable("a", &Type::uint64()).is_ok());
        assert!(
            check_insertable("a", &Type::nullable(Type::string())).is_ok()
        );
        assert!(check_insertable(
            "a",
            &Type::low_cardinality(Type::nullable(Type::string()))
        )
        .is_ok());
        assert!(check_insertable("a", &Type::decimal(18, 4)).is_ok());

        for bad in [
            Type::array(Type::uint8()),
            Type::map(Type::string(), Type::string()),
            Type::tuple(vec![Type::uint8()]),
            Type::json(),
        ] {
            assert!(matches!(
                check_insertable("a", &bad),
                Err(Error::UnsupportedBulkInsertColumn(_))
            ));
        }
    }

    #[test]
    fn identifier_quoting() {
        assert_eq!(quote_identifier("plain"), "`plain`");
        assert_eq!(quote_identifier("with`tick"), "`with``tick`");
    }
}
