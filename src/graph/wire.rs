//! Binary layout buffer shipped to clients.
//!
//! One buffer per layout response: a 4-byte little-endian length prefix
//! covering the node section, the self-describing columnar node table,
//! then the mutation table in the same encoding. A reader can split on the
//! prefix and parse either sub-table independently. This framing is the
//! crate's only binary compatibility contract.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::sparsify::{SparseView, ViewMutation};
use crate::error::{inconsistent, Result};

const COL_I32: u8 = 0x01;
const COL_F32: u8 = 0x02;
const COL_BOOL: u8 = 0x03;

/// Flat node rows accumulated across all trees of a batch.
#[derive(Debug, Default)]
pub struct NodeRows {
    node_id: Vec<i32>,
    parent_id: Vec<i32>,
    is_tip: Vec<bool>,
    tree_idx: Vec<i32>,
    x: Vec<f32>,
    y: Vec<f32>,
}

impl NodeRows {
    /// Appends every node of `view`, tagged with its source tree.
    pub fn push_view(&mut self, view: &SparseView, tree_idx: i32) {
        for node in &view.nodes {
            self.node_id.push(node.id);
            self.parent_id.push(node.parent);
            self.is_tip.push(node.is_tip);
            self.tree_idx.push(tree_idx);
            self.x.push(node.x);
            self.y.push(node.y);
        }
    }

    /// Number of accumulated rows.
    pub fn len(&self) -> usize {
        self.node_id.len()
    }

    /// True when no rows have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.node_id.is_empty()
    }
}

/// Flat mutation rows accumulated across all trees of a batch.
#[derive(Debug, Default)]
pub struct MutationRows {
    x: Vec<f32>,
    y: Vec<f32>,
    tree_idx: Vec<i32>,
    node_id: Vec<i32>,
}

impl MutationRows {
    /// Appends one tree's mutations, tagged with their source tree.
    pub fn push_tree(&mut self, mutations: &[ViewMutation], tree_idx: i32) {
        for m in mutations {
            self.x.push(m.x);
            self.y.push(m.y);
            self.tree_idx.push(tree_idx);
            self.node_id.push(m.node);
        }
    }

    /// Number of accumulated rows.
    pub fn len(&self) -> usize {
        self.node_id.len()
    }

    /// True when no rows have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.node_id.is_empty()
    }
}

enum Column<'a> {
    I32(&'a [i32]),
    F32(&'a [f32]),
    Bool(&'a [bool]),
}

impl Column<'_> {
    fn len(&self) -> usize {
        match self {
            Column::I32(v) => v.len(),
            Column::F32(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Column::I32(_) => COL_I32,
            Column::F32(_) => COL_F32,
            Column::Bool(_) => COL_BOOL,
        }
    }
}

fn write_table(buf: &mut BytesMut, columns: &[(&str, Column<'_>)]) {
    let rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
    debug_assert!(columns.iter().all(|(_, c)| c.len() == rows));

    buf.put_u16_le(columns.len() as u16);
    buf.put_u32_le(rows as u32);
    for (name, column) in columns {
        buf.put_u8(name.len() as u8);
        buf.put_slice(name.as_bytes());
        buf.put_u8(column.tag());
    }
    for (_, column) in columns {
        match column {
            Column::I32(values) => {
                for v in *values {
                    buf.put_i32_le(*v);
                }
            }
            Column::F32(values) => {
                for v in *values {
                    buf.put_f32_le(*v);
                }
            }
            Column::Bool(values) => {
                for v in *values {
                    buf.put_u8(u8::from(*v));
                }
            }
        }
    }
}

/// Serializes a batch into the framed wire buffer. Empty inputs produce a
/// valid buffer with zero rows and the full schema.
pub fn encode_layout(nodes: &NodeRows, mutations: &MutationRows) -> Bytes {
    let mut node_buf = BytesMut::new();
    write_table(
        &mut node_buf,
        &[
            ("node_id", Column::I32(&nodes.node_id)),
            ("parent_id", Column::I32(&nodes.parent_id)),
            ("is_tip", Column::Bool(&nodes.is_tip)),
            ("tree_idx", Column::I32(&nodes.tree_idx)),
            ("x", Column::F32(&nodes.x)),
            ("y", Column::F32(&nodes.y)),
        ],
    );

    let mut out = BytesMut::with_capacity(4 + node_buf.len() + 64);
    out.put_u32_le(node_buf.len() as u32);
    out.extend_from_slice(&node_buf);
    write_table(
        &mut out,
        &[
            ("mut_x", Column::F32(&mutations.x)),
            ("mut_y", Column::F32(&mutations.y)),
            ("mut_tree_idx", Column::I32(&mutations.tree_idx)),
            ("mut_node_id", Column::I32(&mutations.node_id)),
        ],
    );
    out.freeze()
}

/// Decoded column, used by the reference reader.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedColumn {
    /// 32-bit signed integers.
    I32(Vec<i32>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// Booleans.
    Bool(Vec<bool>),
}

/// One decoded sub-table.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    /// Row count shared by every column.
    pub rows: usize,
    /// Columns in wire order.
    pub columns: Vec<(String, DecodedColumn)>,
}

impl DecodedTable {
    /// Column lookup by name.
    pub fn column(&self, name: &str) -> Option<&DecodedColumn> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

fn read_table(buf: &mut impl Buf) -> Result<DecodedTable> {
    if buf.remaining() < 6 {
        return Err(inconsistent("truncated table header"));
    }
    let col_count = buf.get_u16_le() as usize;
    let rows = buf.get_u32_le() as usize;
    let mut schema = Vec::with_capacity(col_count);
    for _ in 0..col_count {
        if buf.remaining() < 1 {
            return Err(inconsistent("truncated column header"));
        }
        let name_len = buf.get_u8() as usize;
        if buf.remaining() < name_len + 1 {
            return Err(inconsistent("truncated column name"));
        }
        let mut name = vec![0u8; name_len];
        buf.copy_to_slice(&mut name);
        let name = String::from_utf8(name).map_err(|_| inconsistent("column name not UTF-8"))?;
        schema.push((name, buf.get_u8()));
    }
    let mut columns = Vec::with_capacity(col_count);
    for (name, tag) in schema {
        let column = match tag {
            COL_I32 => {
                if buf.remaining() < rows * 4 {
                    return Err(inconsistent("truncated i32 column"));
                }
                DecodedColumn::I32((0..rows).map(|_| buf.get_i32_le()).collect())
            }
            COL_F32 => {
                if buf.remaining() < rows * 4 {
                    return Err(inconsistent("truncated f32 column"));
                }
                DecodedColumn::F32((0..rows).map(|_| buf.get_f32_le()).collect())
            }
            COL_BOOL => {
                if buf.remaining() < rows {
                    return Err(inconsistent("truncated bool column"));
                }
                DecodedColumn::Bool((0..rows).map(|_| buf.get_u8() != 0).collect())
            }
            other => return Err(inconsistent(format!("unknown column tag {other:#04x}"))),
        };
        columns.push((name, column));
    }
    Ok(DecodedTable { rows, columns })
}

/// Reference reader for the framed buffer; splits on the length prefix and
/// decodes both sub-tables.
pub fn decode_layout(buffer: &Bytes) -> Result<(DecodedTable, DecodedTable)> {
    let mut buf = buffer.clone();
    if buf.remaining() < 4 {
        return Err(inconsistent("buffer shorter than length prefix"));
    }
    let node_len = buf.get_u32_le() as usize;
    if buf.remaining() < node_len {
        return Err(inconsistent("node section shorter than its prefix"));
    }
    let mut node_section = buf.copy_to_bytes(node_len);
    let nodes = read_table(&mut node_section)?;
    if node_section.has_remaining() {
        return Err(inconsistent("trailing bytes after node table"));
    }
    let mutations = read_table(&mut buf)?;
    Ok((nodes, mutations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_a_valid_buffer() {
        let buffer = encode_layout(&NodeRows::default(), &MutationRows::default());
        let (nodes, mutations) = decode_layout(&buffer).expect("decode");
        assert_eq!(nodes.rows, 0);
        assert_eq!(nodes.columns.len(), 6);
        assert_eq!(mutations.rows, 0);
        assert_eq!(mutations.columns.len(), 4);
        assert!(nodes.column("node_id").is_some());
        assert!(mutations.column("mut_node_id").is_some());
    }

    #[test]
    fn length_prefix_frames_the_node_section() {
        let mut nodes = NodeRows::default();
        nodes.push_view(
            &SparseView {
                nodes: vec![crate::graph::ViewNode {
                    id: 7,
                    parent: -1,
                    is_tip: false,
                    x: 0.5,
                    y: 0.0,
                }],
            },
            3,
        );
        let buffer = encode_layout(&nodes, &MutationRows::default());
        let prefix = u32::from_le_bytes(buffer[0..4].try_into().expect("prefix")) as usize;
        assert!(4 + prefix < buffer.len());

        let (decoded, _) = decode_layout(&buffer).expect("decode");
        assert_eq!(decoded.rows, 1);
        assert_eq!(decoded.column("tree_idx"), Some(&DecodedColumn::I32(vec![3])));
        assert_eq!(decoded.column("x"), Some(&DecodedColumn::F32(vec![0.5])));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let buffer = encode_layout(&NodeRows::default(), &MutationRows::default());
        let truncated = buffer.slice(0..buffer.len() - 3);
        assert!(decode_layout(&truncated).is_err());
    }
}
