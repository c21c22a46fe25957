//! Serialized query stack
//!
//! Items are laid out in pre-order. Every item starts with a type byte;
//! integers are variable-byte encoded (high bit set on the last byte) and
//! weights are zigzag encoded before that. Strings are a vbyte length
//! followed by UTF-8 bytes.
//!
//! | item | payload |
//! |---|---|
//! | and, or, and_not, rank | arity |
//! | near, onear | arity, window |
//! | phrase, same_element, equiv | arity, header |
//! | weighted_set | header, token count, (weight, token)* |
//! | word, number, prefix, substring, suffix, regexp, location | header, term |
//!
//! A header is `flags, id, weight, view`; flag bit 0 marks an unranked term.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::ast::{Node, TermNode, WeightedToken};
use super::types::{TermHeader, TermKind};
use crate::error::{MatchError, Result};

const FLAG_NO_RANK: u8 = 0x01;

/// Item type byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    And = 1,
    Or = 2,
    AndNot = 3,
    Rank = 4,
    Near = 5,
    ONear = 6,
    Phrase = 7,
    SameElement = 8,
    Equiv = 9,
    WeightedSet = 10,
    Word = 11,
    Number = 12,
    Prefix = 13,
    Substring = 14,
    Suffix = 15,
    Regexp = 16,
    Location = 17,
}

impl ItemType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => ItemType::And,
            2 => ItemType::Or,
            3 => ItemType::AndNot,
            4 => ItemType::Rank,
            5 => ItemType::Near,
            6 => ItemType::ONear,
            7 => ItemType::Phrase,
            8 => ItemType::SameElement,
            9 => ItemType::Equiv,
            10 => ItemType::WeightedSet,
            11 => ItemType::Word,
            12 => ItemType::Number,
            13 => ItemType::Prefix,
            14 => ItemType::Substring,
            15 => ItemType::Suffix,
            16 => ItemType::Regexp,
            17 => ItemType::Location,
            _ => return None,
        })
    }

    fn term_kind(self) -> Option<TermKind> {
        Some(match self {
            ItemType::Word => TermKind::Word,
            ItemType::Number => TermKind::Number,
            ItemType::Prefix => TermKind::Prefix,
            ItemType::Substring => TermKind::Substring,
            ItemType::Suffix => TermKind::Suffix,
            ItemType::Regexp => TermKind::Regexp,
            ItemType::Location => TermKind::Location,
            _ => return None,
        })
    }

    fn for_term_kind(kind: TermKind) -> Self {
        match kind {
            TermKind::Word => ItemType::Word,
            TermKind::Number => ItemType::Number,
            TermKind::Prefix => ItemType::Prefix,
            TermKind::Substring => ItemType::Substring,
            TermKind::Suffix => ItemType::Suffix,
            TermKind::Regexp => ItemType::Regexp,
            TermKind::Location => ItemType::Location,
        }
    }
}

/// Header fields of a term-bearing item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemHeader {
    pub id: u32,
    pub weight: i32,
    pub view: String,
    pub ranked: bool,
}

/// One decoded stack item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackItem {
    Intermediate {
        item_type: ItemType,
        arity: u32,
    },
    Proximity {
        item_type: ItemType,
        arity: u32,
        window: u32,
    },
    Group {
        item_type: ItemType,
        arity: u32,
        header: ItemHeader,
    },
    WeightedSet {
        header: ItemHeader,
        tokens: Vec<(String, i32)>,
    },
    Term {
        kind: TermKind,
        header: ItemHeader,
        term: String,
    },
}

/// Encodes a query tree into its stack representation
pub struct StackDump;

impl StackDump {
    pub fn encode(root: &Node) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_node(root, &mut buf);
        buf.freeze()
    }

    fn encode_node(node: &Node, buf: &mut BytesMut) {
        match node {
            Node::Term(TermNode { header, term, kind }) => {
                buf.put_u8(ItemType::for_term_kind(*kind) as u8);
                put_header(buf, header);
                put_string(buf, term);
            }
            Node::And(i) | Node::Or(i) | Node::AndNot(i) | Node::Rank(i) => {
                let item_type = match node {
                    Node::And(_) => ItemType::And,
                    Node::Or(_) => ItemType::Or,
                    Node::AndNot(_) => ItemType::AndNot,
                    _ => ItemType::Rank,
                };
                buf.put_u8(item_type as u8);
                put_vbyte(buf, i.children.len() as u32);
                for child in &i.children {
                    Self::encode_node(child, buf);
                }
            }
            Node::Near(p) | Node::ONear(p) => {
                let item_type = if matches!(node, Node::Near(_)) {
                    ItemType::Near
                } else {
                    ItemType::ONear
                };
                buf.put_u8(item_type as u8);
                put_vbyte(buf, p.children.len() as u32);
                put_vbyte(buf, p.window);
                for child in &p.children {
                    Self::encode_node(child, buf);
                }
            }
            Node::Phrase(g) | Node::SameElement(g) | Node::Equiv(g) => {
                let item_type = match node {
                    Node::Phrase(_) => ItemType::Phrase,
                    Node::SameElement(_) => ItemType::SameElement,
                    _ => ItemType::Equiv,
                };
                buf.put_u8(item_type as u8);
                put_vbyte(buf, g.children.len() as u32);
                put_header(buf, &g.header);
                for child in &g.children {
                    Self::encode_node(child, buf);
                }
            }
            Node::WeightedSet(ws) => {
                buf.put_u8(ItemType::WeightedSet as u8);
                put_header(buf, &ws.header);
                put_vbyte(buf, ws.tokens.len() as u32);
                for WeightedToken { token, weight } in &ws.tokens {
                    put_vbyte(buf, zigzag(weight.0));
                    put_string(buf, token);
                }
            }
        }
    }
}

/// Iterates the items of a serialized query stack
pub struct StackDumpIterator<'s> {
    buf: &'s [u8],
}

impl<'s> StackDumpIterator<'s> {
    pub fn new(stack: &'s [u8]) -> Self {
        Self { buf: stack }
    }

    pub fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn read_item(&mut self) -> Result<StackItem> {
        let byte = self.buf.get_u8();
        let item_type = ItemType::from_u8(byte)
            .ok_or_else(|| MatchError::malformed(format!("unknown item type {}", byte)))?;

        let item = match item_type {
            ItemType::And | ItemType::Or | ItemType::AndNot | ItemType::Rank => {
                StackItem::Intermediate {
                    item_type,
                    arity: get_vbyte(&mut self.buf)?,
                }
            }
            ItemType::Near | ItemType::ONear => StackItem::Proximity {
                item_type,
                arity: get_vbyte(&mut self.buf)?,
                window: get_vbyte(&mut self.buf)?,
            },
            ItemType::Phrase | ItemType::SameElement | ItemType::Equiv => StackItem::Group {
                item_type,
                arity: get_vbyte(&mut self.buf)?,
                header: get_header(&mut self.buf)?,
            },
            ItemType::WeightedSet => {
                let header = get_header(&mut self.buf)?;
                let count = get_vbyte(&mut self.buf)?;
                let mut tokens = Vec::new();
                for _ in 0..count {
                    let weight = unzigzag(get_vbyte(&mut self.buf)?);
                    tokens.push((get_string(&mut self.buf)?, weight));
                }
                StackItem::WeightedSet { header, tokens }
            }
            term_type => {
                let kind = term_type
                    .term_kind()
                    .ok_or_else(|| MatchError::malformed("not a term item"))?;
                StackItem::Term {
                    kind,
                    header: get_header(&mut self.buf)?,
                    term: get_string(&mut self.buf)?,
                }
            }
        };
        Ok(item)
    }
}

impl<'s> Iterator for StackDumpIterator<'s> {
    type Item = Result<StackItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.buf.has_remaining() {
            return None;
        }
        Some(self.read_item())
    }
}

fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn put_vbyte(buf: &mut BytesMut, value: u32) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf.put_u8(byte | 0x80);
            break;
        }
        buf.put_u8(byte);
    }
}

fn get_vbyte(buf: &mut &[u8]) -> Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err(MatchError::malformed("unexpected end of vbyte"));
        }
        let byte = buf.get_u8();
        let payload = (byte & 0x7F) as u32;
        // the fifth byte only has room for the top four bits
        if shift == 28 && payload > 0x0F {
            return Err(MatchError::malformed("vbyte value too large"));
        }
        result |= payload << shift;
        if byte & 0x80 != 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 28 {
            return Err(MatchError::malformed("vbyte value too large"));
        }
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_vbyte(buf, s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let len = get_vbyte(buf)? as usize;
    if buf.remaining() < len {
        return Err(MatchError::malformed("string runs past end of stack"));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| MatchError::malformed("string is not valid UTF-8"))
}

fn put_header(buf: &mut BytesMut, header: &TermHeader) {
    buf.put_u8(if header.ranked { 0 } else { FLAG_NO_RANK });
    put_vbyte(buf, header.id.0);
    put_vbyte(buf, zigzag(header.weight.0));
    put_string(buf, &header.view);
}

fn get_header(buf: &mut &[u8]) -> Result<ItemHeader> {
    if !buf.has_remaining() {
        return Err(MatchError::malformed("unexpected end of item header"));
    }
    let flags = buf.get_u8();
    Ok(ItemHeader {
        ranked: flags & FLAG_NO_RANK == 0,
        id: get_vbyte(buf)?,
        weight: unzigzag(get_vbyte(buf)?),
        view: get_string(buf)?,
    })
}
