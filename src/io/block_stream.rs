//! Block codec: the data-block body layout, framing dispatch, and the
//! column factory.
//!
//! Wire order of a block body: the block-info preamble (`varint 1`,
//! overflow byte, `varint 2`, bucket i32, `varint 0`), the column and row
//! counts as varints, then per column its name, type string, custom
//! serialisation marker (revision-gated, always zero), serialisation
//! prefix and payload. In a compressed session the whole body travels
//! inside one compressed frame; otherwise it is inlined and delimited by
//! skipping.

use crate::{
    block::{
        Block,
        BlockInfo,
    },
    column::{
        skip,
        Column,
        ColumnArray,
        ColumnDate,
        ColumnDate32,
        ColumnDateTime,
        ColumnDateTime64,
        ColumnDecimal,
        ColumnEnum16,
        ColumnEnum8,
        ColumnFixedString,
        ColumnIpv4,
        ColumnIpv6,
        ColumnJson,
        ColumnLowCardinality,
        ColumnMap,
        ColumnNothing,
        ColumnNullable,
        ColumnRef,
        ColumnString,
        ColumnStringLazy,
        ColumnTuple,
        ColumnUuid,
        ColumnVector,
    },
    compression::{
        self,
        FrameHeader,
        CHECKSUM_SIZE,
        HEADER_SIZE,
    },
    connection::Connection,
    io::buffer_utils::{
        self,
        try_read_varint,
        try_skip_string,
    },
    protocol::{
        CompressionMethod,
        StringMaterialization,
        DBMS_MIN_REVISION_WITH_BLOCK_INFO,
        DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
        DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES,
    },
    types::{
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::sync::Arc;

/// Create an empty column for a descriptor, with eager strings.
pub fn create_column(type_: &Type) -> Result<ColumnRef> {
    create_column_with(type_, StringMaterialization::Eager)
}

/// Create an empty column for a descriptor with the given string
/// materialisation. Lazy mode reaches strings nested in Nullable, Array,
/// Map and Tuple; LowCardinality dictionaries stay eager because they
/// materialise each unique value once.
pub fn create_column_with(
    type_: &Type,
    strings: StringMaterialization,
) -> Result<ColumnRef> {
    Ok(match type_ {
        Type::Simple(code) => match code {
            TypeCode::UInt8 | TypeCode::Bool => {
                Arc::new(ColumnVector::<u8>::with_type(type_.clone()))
            }
            TypeCode::UInt16 => {
                Arc::new(ColumnVector::<u16>::with_type(type_.clone()))
            }
            TypeCode::UInt32 => {
                Arc::new(ColumnVector::<u32>::with_type(type_.clone()))
            }
            TypeCode::UInt64 => {
                Arc::new(ColumnVector::<u64>::with_type(type_.clone()))
            }
            TypeCode::UInt128 => {
                Arc::new(ColumnVector::<u128>::with_type(type_.clone()))
            }
            TypeCode::UInt256 => Arc::new(ColumnVector::<
                crate::types::u256,
            >::with_type(type_.clone())),
            TypeCode::Int8 => {
                Arc::new(ColumnVector::<i8>::with_type(type_.clone()))
            }
            TypeCode::Int16 => {
                Arc::new(ColumnVector::<i16>::with_type(type_.clone()))
            }
            TypeCode::Int32 => {
                Arc::new(ColumnVector::<i32>::with_type(type_.clone()))
            }
            TypeCode::Int64 => {
                Arc::new(ColumnVector::<i64>::with_type(type_.clone()))
            }
            TypeCode::Int128 => {
                Arc::new(ColumnVector::<i128>::with_type(type_.clone()))
            }
            TypeCode::Int256 => Arc::new(ColumnVector::<
                crate::types::i256,
            >::with_type(type_.clone())),
            TypeCode::Float32 => {
                Arc::new(ColumnVector::<f32>::with_type(type_.clone()))
            }
            TypeCode::Float64 => {
                Arc::new(ColumnVector::<f64>::with_type(type_.clone()))
            }
            TypeCode::String => match strings {
                StringMaterialization::Eager => Arc::new(ColumnString::new()),
                StringMaterialization::Lazy => {
                    Arc::new(ColumnStringLazy::new())
                }
            },
            TypeCode::Date => Arc::new(ColumnDate::new(type_.clone())),
            TypeCode::Date32 => Arc::new(ColumnDate32::new(type_.clone())),
            TypeCode::UUID => Arc::new(ColumnUuid::new()),
            TypeCode::IPv4 => Arc::new(ColumnIpv4::new()),
            TypeCode::IPv6 => Arc::new(ColumnIpv6::new()),
            TypeCode::Json => Arc::new(ColumnJson::new()),
            TypeCode::Nothing => Arc::new(ColumnNothing::new()),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "no column implementation for {}",
                    other.name()
                )))
            }
        },
        Type::FixedString { .. } => {
            Arc::new(ColumnFixedString::new(type_.clone())?)
        }
        Type::DateTime { .. } => Arc::new(ColumnDateTime::new(type_.clone())),
        Type::DateTime64 { .. } => {
            Arc::new(ColumnDateTime64::new(type_.clone()))
        }
        Type::Decimal { .. } => Arc::new(ColumnDecimal::new(type_.clone())?),
        Type::Enum8 { .. } => Arc::new(ColumnEnum8::new(type_.clone())?),
        Type::Enum16 { .. } => Arc::new(ColumnEnum16::new(type_.clone())?),
        Type::Nullable { nested_type } => {
            let nested = create_column_with(nested_type, strings)?;
            Arc::new(ColumnNullable::with_nested(nested))
        }
        Type::Array { item_type } => {
            let nested = create_column_with(item_type, strings)?;
            Arc::new(ColumnArray::from_parts(type_.clone(), nested))
        }
        Type::Map { key_type, value_type } => {
            let keys = create_column_with(key_type, strings)?;
            let values = create_column_with(value_type, strings)?;
            Arc::new(ColumnMap::from_parts(type_.clone(), keys, values))
        }
        Type::Tuple { item_types, .. } => {
            let columns = item_types
                .iter()
                .map(|t| create_column_with(t, strings))
                .collect::<Result<Vec<_>>>()?;
            Arc::new(ColumnTuple::from_columns(type_.clone(), columns))
        }
        Type::Nested { item_types, .. } => {
            let columns = item_types
                .iter()
                .map(|t| {
                    create_column_with(&Type::array(t.clone()), strings)
                })
                .collect::<Result<Vec<_>>>()?;
            Arc::new(ColumnTuple::from_columns(type_.clone(), columns))
        }
        Type::LowCardinality { .. } => {
            Arc::new(ColumnLowCardinality::new(type_.clone())?)
        }
    })
}

fn read_block_info(buffer: &mut &[u8]) -> Result<BlockInfo> {
    let field = buffer_utils::read_varint(buffer)?;
    if field != 1 {
        return Err(Error::MalformedWire(format!(
            "block preamble: expected field 1, got {}",
            field
        )));
    }
    buffer_utils::ensure(buffer, 1, "block overflow flag")?;
    let is_overflows = buffer.get_u8();

    let field = buffer_utils::read_varint(buffer)?;
    if field != 2 {
        return Err(Error::MalformedWire(format!(
            "block preamble: expected field 2, got {}",
            field
        )));
    }
    buffer_utils::ensure(buffer, 4, "block bucket number")?;
    let bucket_num = buffer.get_i32_le();

    let field = buffer_utils::read_varint(buffer)?;
    if field != 0 {
        return Err(Error::MalformedWire(format!(
            "block preamble: expected terminator, got {}",
            field
        )));
    }

    Ok(BlockInfo { is_overflows, bucket_num })
}

fn write_block_info(buffer: &mut BytesMut, info: &BlockInfo) {
    // Field markers are emitted verbatim even for default values.
    buffer_utils::write_varint(buffer, 1);
    buffer.put_u8(info.is_overflows);
    buffer_utils::write_varint(buffer, 2);
    buffer.put_i32_le(info.bucket_num);
    buffer_utils::write_varint(buffer, 0);
}

/// Parse a block body from a complete in-memory buffer.
pub fn parse_block_body(
    buffer: &mut &[u8],
    revision: u64,
    strings: StringMaterialization,
) -> Result<Block> {
    let mut block = Block::new();

    if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
        block.set_info(read_block_info(buffer)?);
    }

    let column_count = buffer_utils::read_varint(buffer)? as usize;
    let row_count = buffer_utils::read_varint(buffer)? as usize;

    for _ in 0..column_count {
        let name = buffer_utils::read_string(buffer)?;
        let type_name = buffer_utils::read_string(buffer)?;

        if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            buffer_utils::ensure(buffer, 1, "custom serialization marker")?;
            let custom = buffer.get_u8();
            if custom != 0 {
                return Err(Error::MalformedWire(
                    "custom column serialization is not supported".to_string(),
                ));
            }
        }

        let column_type = Type::parse(&type_name)?;
        let mut column = create_column_with(&column_type, strings)?;

        if row_count > 0 {
            let column_mut = Arc::get_mut(&mut column)
                .expect("freshly created column is unshared");
            column_mut.load_prefix(buffer)?;
            column_mut.load_from_buffer(buffer, row_count)?;
        }

        block.append_column(name, column)?;
    }

    // Zero-column blocks still carry the row count they claim.
    if column_count == 0 && row_count != 0 {
        return Err(Error::MalformedWire(
            "block claims rows but has no columns".to_string(),
        ));
    }

    Ok(block)
}

/// Serialise a block body into a buffer.
pub fn write_block_body(
    buffer: &mut BytesMut,
    block: &Block,
    revision: u64,
) -> Result<()> {
    if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
        write_block_info(buffer, block.info());
    }

    buffer_utils::write_varint(buffer, block.column_count() as u64);
    buffer_utils::write_varint(buffer, block.row_count() as u64);

    for (name, type_, column) in block.iter() {
        buffer_utils::write_string(buffer, name);
        buffer_utils::write_string(buffer, &type_.name());

        if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            buffer.put_u8(0);
        }

        if block.row_count() > 0 {
            column.save_prefix(buffer)?;
            column.save_to_buffer(buffer)?;
        }
    }

    Ok(())
}

/// Advance past a complete block body, or report that more bytes are
/// needed. Used to delimit uncompressed blocks on the stream; skippers
/// and readers consume identical byte counts.
pub fn try_skip_block_body(
    buffer: &mut &[u8],
    revision: u64,
) -> Result<Option<()>> {
    if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
        // Preamble: varint 1, overflow byte, varint 2, bucket i32,
        // varint 0.
        let expect_marker = |buffer: &mut &[u8], tag: u64| {
            match try_read_varint(buffer)? {
                Some(found) if found == tag => Ok(Some(())),
                Some(found) => Err(Error::MalformedWire(format!(
                    "block preamble: expected field {}, got {}",
                    tag, found
                ))),
                None => Ok(None),
            }
        };

        if expect_marker(buffer, 1)?.is_none() {
            return Ok(None);
        }
        if buffer.is_empty() {
            return Ok(None);
        }
        buffer.advance(1);

        if expect_marker(buffer, 2)?.is_none() {
            return Ok(None);
        }
        if buffer.len() < 4 {
            return Ok(None);
        }
        buffer.advance(4);

        if expect_marker(buffer, 0)?.is_none() {
            return Ok(None);
        }
    }

    let column_count = match try_read_varint(buffer)? {
        Some(n) => n as usize,
        None => return Ok(None),
    };
    let row_count = match try_read_varint(buffer)? {
        Some(n) => n as usize,
        None => return Ok(None),
    };

    for _ in 0..column_count {
        if try_skip_string(buffer)?.is_none() {
            return Ok(None);
        }

        // The type string must be materialised to know the payload shape.
        let mut probe = *buffer;
        let type_len = match try_read_varint(&mut probe)? {
            Some(len) => len as usize,
            None => return Ok(None),
        };
        if probe.len() < type_len {
            return Ok(None);
        }
        let type_name = std::str::from_utf8(&probe[..type_len])?;
        let column_type = Type::parse(type_name)?;
        probe.advance(type_len);
        *buffer = probe;

        if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            if buffer.is_empty() {
                return Ok(None);
            }
            buffer.advance(1);
        }

        if row_count > 0 {
            if skip::try_skip_prefix(buffer, &column_type)?.is_none() {
                return Ok(None);
            }
            if skip::try_skip_column(buffer, &column_type, row_count)?
                .is_none()
            {
                return Ok(None);
            }
        }
    }

    Ok(Some(()))
}

/// Reads data blocks from a connection, honouring the session's framing
/// and string materialisation.
pub struct BlockReader {
    revision: u64,
    compression: CompressionMethod,
    strings: StringMaterialization,
}

impl BlockReader {
    /// Create a reader for the negotiated revision.
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            compression: CompressionMethod::None,
            strings: StringMaterialization::Eager,
        }
    }

    /// Route block bodies through compressed framing.
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Select the string materialisation mode.
    pub fn with_strings(mut self, strings: StringMaterialization) -> Self {
        self.strings = strings;
        self
    }

    /// Read one block body from the connection. The caller has already
    /// consumed the message discriminator and table name.
    pub async fn read_block(&self, conn: &mut Connection) -> Result<Block> {
        if self.compression.is_enabled() {
            self.read_framed_block(conn).await
        } else {
            self.read_inline_block(conn).await
        }
    }

    async fn read_framed_block(&self, conn: &mut Connection) -> Result<Block> {
        let mut head = [0u8; CHECKSUM_SIZE + HEADER_SIZE];
        conn.read_exact(&mut head).await?;

        let header = FrameHeader::parse(&head[CHECKSUM_SIZE..])?;
        let payload_len = header.compressed_size - HEADER_SIZE;

        let mut frame = Vec::with_capacity(head.len() + payload_len);
        frame.extend_from_slice(&head);
        frame.resize(head.len() + payload_len, 0);
        conn.read_exact(&mut frame[head.len()..]).await?;

        let body = compression::decompress(&frame)?;
        tracing::trace!(
            compressed = header.compressed_size,
            uncompressed = header.uncompressed_size,
            "read compressed block frame"
        );

        let mut cursor = &body[..];
        let block = parse_block_body(&mut cursor, self.revision, self.strings)?;
        if !cursor.is_empty() {
            return Err(Error::MalformedWire(format!(
                "{} trailing bytes after block body",
                cursor.len()
            )));
        }
        Ok(block)
    }

    // Uncompressed bodies have no length framing; the block is delimited
    // by skipping over buffered bytes and pulling more until it is whole.
    async fn read_inline_block(&self, conn: &mut Connection) -> Result<Block> {
        loop {
            let mut probe = conn.buffered();
            match try_skip_block_body(&mut probe, self.revision)? {
                Some(()) => {
                    let consumed = conn.buffered().len() - probe.len();
                    let body = conn.take_buffered(consumed);

                    let mut cursor = &body[..];
                    let block = parse_block_body(
                        &mut cursor,
                        self.revision,
                        self.strings,
                    )?;
                    debug_assert!(cursor.is_empty());
                    return Ok(block);
                }
                None => {
                    conn.fill_buffer().await?;
                }
            }
        }
    }
}

/// Writes data blocks to a connection, honouring the session's framing.
pub struct BlockWriter {
    revision: u64,
    compression: CompressionMethod,
}

impl BlockWriter {
    /// Create a writer for the negotiated revision.
    pub fn new(revision: u64) -> Self {
        Self { revision, compression: CompressionMethod::None }
    }

    /// Route block bodies through compressed framing.
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Write one block, including the leading (empty) table name. The
    /// caller writes the message discriminator.
    pub async fn write_block(
        &self,
        conn: &mut Connection,
        block: &Block,
    ) -> Result<()> {
        if self.revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            conn.write_string("").await?;
        }

        let mut body = BytesMut::new();
        write_block_body(&mut body, block, self.revision)?;

        if self.compression.is_enabled() {
            let frame = compression::compress(self.compression, &body)?;
            tracing::trace!(
                raw = body.len(),
                framed = frame.len(),
                "wrote compressed block frame"
            );
            conn.write_bytes(&frame).await?;
        } else {
            conn.write_bytes(&body).await?;
        }

        Ok(())
    }
}
