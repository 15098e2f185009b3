//! Positional postings model and its two byte encodings.
//!
//! A token's postings are a list of `(doc_id, positions)` entries sorted by
//! ascending doc id; positions are the 0-based n-gram window ordinals within
//! each document. The same structures serve as the in-memory ingest buffer
//! (`InvertedIndex`) and as the unit persisted per token row.

use std::collections::HashMap;

use ngram_model::{CompressMethod, Count, DocId, Position, TokenId};

use crate::codec::{golomb_decode, golomb_encode, BitReader, BitWriter};

/// Golomb divisor for doc-id deltas.
const M_DOC: u32 = 128;
/// Golomb divisor for per-document position counts.
const M_COUNT: u32 = 8;
/// Golomb divisor for position deltas.
const M_POS: u32 = 16;

/// Postings of one token in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingItem {
    pub doc_id: DocId,
    /// Window ordinals, ascending.
    pub positions: Vec<Position>,
}

/// Postings of one token across documents, sorted by ascending doc id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    items: Vec<PostingItem>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[PostingItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct documents in the list.
    pub fn documents_count(&self) -> Count {
        self.items.len() as Count
    }

    /// Append one position, keeping items ordered by doc id. Positions of a
    /// single document arrive in emission order and stay ascending.
    pub fn add_posting(&mut self, doc_id: DocId, position: Position) {
        match self.items.binary_search_by_key(&doc_id, |item| item.doc_id) {
            Ok(i) => self.items[i].positions.push(position),
            Err(i) => self.items.insert(
                i,
                PostingItem {
                    doc_id,
                    positions: vec![position],
                },
            ),
        }
    }

    /// Merge another list into this one: positions of shared documents are
    /// concatenated, re-sorted and deduplicated; new documents are inserted
    /// in doc-id order.
    pub fn merge(&mut self, other: &PostingList) {
        for item in &other.items {
            match self
                .items
                .binary_search_by_key(&item.doc_id, |existing| existing.doc_id)
            {
                Ok(i) => {
                    let positions = &mut self.items[i].positions;
                    positions.extend_from_slice(&item.positions);
                    positions.sort_unstable();
                    positions.dedup();
                }
                Err(i) => self.items.insert(i, item.clone()),
            }
        }
    }

    /// Encode the list with the given method. Pure on the list state.
    pub fn serialize(&self, method: CompressMethod) -> Vec<u8> {
        match method {
            CompressMethod::None => self.serialize_raw(),
            CompressMethod::Golomb => self.serialize_golomb(),
        }
    }

    /// Decode a blob produced by [`PostingList::serialize`] with the same
    /// method. A truncated blob yields the items decoded before the cut.
    pub fn deserialize(data: &[u8], method: CompressMethod) -> Self {
        match method {
            CompressMethod::None => Self::deserialize_raw(data),
            CompressMethod::Golomb => Self::deserialize_golomb(data),
        }
    }

    fn serialize_raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((self.items.len() as i32).to_le_bytes());
        for item in &self.items {
            out.extend(item.doc_id.to_le_bytes());
            out.extend((item.positions.len() as i32).to_le_bytes());
            for &position in &item.positions {
                out.extend(position.to_le_bytes());
            }
        }
        out
    }

    fn deserialize_raw(data: &[u8]) -> Self {
        let mut list = PostingList::new();
        let mut cursor = data;
        let Some(items_count) = read_i32_le(&mut cursor) else {
            return list;
        };
        for _ in 0..items_count.max(0) {
            let Some(doc_id) = read_i32_le(&mut cursor) else {
                break;
            };
            let Some(positions_count) = read_i32_le(&mut cursor) else {
                break;
            };
            let mut positions = Vec::with_capacity(positions_count.max(0) as usize);
            for _ in 0..positions_count.max(0) {
                let Some(position) = read_i32_le(&mut cursor) else {
                    break;
                };
                positions.push(position);
            }
            list.items.push(PostingItem { doc_id, positions });
        }
        list
    }

    fn serialize_golomb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((self.items.len() as i32).to_le_bytes());

        let mut writer = BitWriter::new();
        let mut prev_doc_id: DocId = 0;
        for item in &self.items {
            golomb_encode((item.doc_id - prev_doc_id) as u32, M_DOC, &mut writer);
            prev_doc_id = item.doc_id;

            golomb_encode(item.positions.len() as u32, M_COUNT, &mut writer);
            let mut prev_pos: Position = 0;
            for &position in &item.positions {
                golomb_encode((position - prev_pos) as u32, M_POS, &mut writer);
                prev_pos = position;
            }
        }
        out.extend(writer.into_bytes());
        out
    }

    fn deserialize_golomb(data: &[u8]) -> Self {
        let mut list = PostingList::new();
        let mut cursor = data;
        let Some(items_count) = read_i32_le(&mut cursor) else {
            return list;
        };

        let mut reader = BitReader::new(cursor);
        let mut prev_doc_id: DocId = 0;
        'items: for _ in 0..items_count.max(0) {
            let Some(doc_delta) = golomb_decode(M_DOC, &mut reader) else {
                break;
            };
            let doc_id = prev_doc_id + doc_delta as DocId;
            prev_doc_id = doc_id;

            let Some(positions_count) = golomb_decode(M_COUNT, &mut reader) else {
                break;
            };
            let mut positions = Vec::with_capacity(positions_count as usize);
            let mut prev_pos: Position = 0;
            for _ in 0..positions_count {
                let Some(pos_delta) = golomb_decode(M_POS, &mut reader) else {
                    list.items.push(PostingItem { doc_id, positions });
                    break 'items;
                };
                let position = prev_pos + pos_delta as Position;
                prev_pos = position;
                positions.push(position);
            }
            list.items.push(PostingItem { doc_id, positions });
        }
        list
    }
}

fn read_i32_le(cursor: &mut &[u8]) -> Option<i32> {
    let (head, tail) = cursor.split_first_chunk::<4>()?;
    *cursor = tail;
    Some(i32::from_le_bytes(*head))
}

/// In-memory ingest buffer: token id to its buffered postings.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    map: HashMap<TokenId, PostingList>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token_id: TokenId, doc_id: DocId, position: Position) {
        self.map
            .entry(token_id)
            .or_default()
            .add_posting(doc_id, position);
    }

    pub fn get(&self, token_id: TokenId) -> Option<&PostingList> {
        self.map.get(&token_id)
    }

    /// Number of distinct buffered tokens (the flush trigger quantity).
    pub fn size(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &PostingList)> {
        self.map.iter().map(|(&token_id, list)| (token_id, list))
    }
}
