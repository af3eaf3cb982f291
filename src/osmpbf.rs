//! Reader of the OSM pbf container format.
//!
//! The file is indexed once: for every blob we remember its position and
//! which kinds of primitives it contains. Passes then read blocks by position
//! without touching blobs they are not interested in.

pub mod proto;

use crate::block::{self, Contents, Member, MemberType, PrimitiveBlock};
use crate::source::BlockSource;

use byteorder::{ByteOrder, NetworkEndian};
use flate2::read::ZlibDecoder;
use log::{debug, info};
use memmap2::Mmap;
use prost::{self, Message};
use rayon::prelude::*;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str;

/// Features a pbf file may require which we are able to read.
const SUPPORTED_FEATURES: &[&str] = &["OsmSchema-V0.6", "DenseNodes"];

/// Coordinates in pbf are stored in units of nanodegrees.
const NANO_DEGREE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Data(Contents),
}

/// Decodes the kinds of primitives contained in a PrimitiveBlock protobuf
/// message.
///
/// This does not decode any primitives, it just checks which fields are
/// present in the PrimitiveGroup messages of the block.
///
/// `blob` should contain decompressed data of an OSMData PrimitiveBlock.
///
/// Note: We use public API of `prost` crate, which though is not exposed in
/// the crate and marked with comment that it should be only used from
/// `prost::Message`.
pub fn contents_from_osmdata_blob(mut blob: &[u8]) -> io::Result<Contents> {
    const PRIMITIVE_GROUP_TAG: u32 = 2;
    const NODES_TAG: u32 = 1;
    const DENSE_NODES_TAG: u32 = 2;
    const WAYS_TAG: u32 = 3;
    const RELATIONS_TAG: u32 = 4;
    const CHANGESETS_TAG: u32 = 5;

    let mut contents = Contents::NONE;
    while !blob.is_empty() {
        // decode fields of PrimitiveBlock
        let (key, wire_type) = prost::encoding::decode_key(&mut blob)?;
        if key != PRIMITIVE_GROUP_TAG {
            prost::encoding::skip_field(
                wire_type,
                key,
                &mut blob,
                prost::encoding::DecodeContext::default(),
            )?;
            continue;
        }

        let len = prost::encoding::decode_varint(&mut blob)? as usize;
        if len > blob.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed primitive group",
            ));
        }
        let (mut group, rest) = blob.split_at(len);
        blob = rest;
        if group.is_empty() {
            continue;
        }

        // Following the specs of OSMPBF, a group has a single kind of
        // primitives, so the first field defines its type.
        let (tag, _wire_type) = prost::encoding::decode_key(&mut group)?;
        contents |= match tag {
            NODES_TAG | DENSE_NODES_TAG => Contents::NODES,
            WAYS_TAG => Contents::WAYS,
            RELATIONS_TAG => Contents::RELATIONS,
            CHANGESETS_TAG => Contents::NONE,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid input data: malformed primitive block",
                ))
            }
        };
    }
    Ok(contents)
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BlockIndex {
    pub kind: BlockKind,
    pub blob_start: usize,
    pub blob_len: usize,
}

struct BlockIndexIterator<'a> {
    data: &'a [u8],
    cursor: usize,
}

enum BlobInfo {
    Header(BlockIndex),
    Unknown(usize, usize),
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated pbf file")
}

impl<'a> BlockIndexIterator<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn read(&mut self, len: usize) -> io::Result<&'a [u8]> {
        let data = self
            .data
            .get(self.cursor..self.cursor + len)
            .ok_or_else(truncated)?;
        self.cursor += len;
        Ok(data)
    }

    fn next_blob(&mut self) -> io::Result<BlobInfo> {
        // read size of blob header
        let blob_header_len = NetworkEndian::read_i32(self.read(4)?);
        if blob_header_len < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "negative blob header size",
            ));
        }

        // read blob header
        let blob_header = proto::BlobHeader::decode(self.read(blob_header_len as usize)?)?;

        let blob_start = self.cursor;
        let blob_len = usize::try_from(blob_header.datasize)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative blob size"))?;
        self.read(blob_len)?;

        match blob_header.r#type.as_str() {
            "OSMHeader" => Ok(BlobInfo::Header(BlockIndex {
                kind: BlockKind::Header,
                blob_start,
                blob_len,
            })),
            "OSMData" => Ok(BlobInfo::Unknown(blob_start, blob_len)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown blob type: {}", other),
            )),
        }
    }
}

impl<'a> Iterator for BlockIndexIterator<'a> {
    type Item = io::Result<BlobInfo>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor < self.data.len() {
            let next = self.next_blob();
            if next.is_err() {
                // no way to resynchronize after a broken header
                self.cursor = self.data.len();
            }
            Some(next)
        } else {
            None
        }
    }
}

/// Returns the decompressed payload of a blob.
fn blob_data(blob: proto::Blob) -> io::Result<Vec<u8>> {
    let data = if let Some(raw) = blob.raw {
        raw
    } else if let Some(zlib_data) = blob.zlib_data {
        let mut blob_buf = Vec::with_capacity(blob.raw_size.unwrap_or(0).max(0) as usize);
        let mut decoder = ZlibDecoder::new(&zlib_data[..]);
        decoder.read_to_end(&mut blob_buf)?;
        blob_buf
    } else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unknown compression",
        ));
    };
    if let Some(raw_size) = blob.raw_size {
        if raw_size as usize != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "blob size mismatch: expected {}, got {}",
                    raw_size,
                    data.len()
                ),
            ));
        }
    }
    Ok(data)
}

/// Reads the blob at `idx` and decodes its payload as message `T`.
pub fn read_block<T: prost::Message + Default>(data: &[u8], idx: &BlockIndex) -> io::Result<T> {
    let blob = data
        .get(idx.blob_start..idx.blob_start + idx.blob_len)
        .ok_or_else(truncated)?;
    let blob = proto::Blob::decode(blob)?;
    let blob_data = blob_data(blob)?;
    Ok(T::decode(blob_data.as_slice())?)
}

fn blob_kind_from_blob_info(
    data: &[u8],
    blob_start: usize,
    blob_len: usize,
) -> io::Result<BlockIndex> {
    let blob = proto::Blob::decode(&data[blob_start..blob_start + blob_len])?;
    let blob_data = blob_data(blob)?;
    Ok(BlockIndex {
        kind: BlockKind::Data(contents_from_osmdata_blob(&blob_data[..])?),
        blob_start,
        blob_len,
    })
}

/// Indexes all blobs of a pbf file in parallel. The result is in file order.
pub fn build_block_index(pbf_data: &[u8]) -> io::Result<Vec<BlockIndex>> {
    let mut result = BlockIndexIterator::new(pbf_data)
        .par_bridge()
        .map(|blob| match blob? {
            BlobInfo::Header(b) => Ok(b),
            BlobInfo::Unknown(start, len) => blob_kind_from_blob_info(pbf_data, start, len),
        })
        .collect::<io::Result<Vec<BlockIndex>>>()?;
    result.par_sort_unstable_by_key(|b| b.blob_start);
    info!("Found {} blocks", result.len());
    Ok(result)
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn string_table(pbf_stringtable: &proto::StringTable) -> io::Result<Vec<String>> {
    pbf_stringtable
        .s
        .iter()
        .map(|x| {
            str::from_utf8(x)
                .map(str::to_string)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
        .collect()
}

fn tags(keys: &[u32], vals: &[u32]) -> io::Result<Vec<block::Tag>> {
    if keys.len() != vals.len() {
        return Err(invalid_data("invalid input data: keys and values differ in length"));
    }
    Ok(keys.iter().copied().zip(vals.iter().copied()).collect())
}

/// Decodes a protobuf primitive block into an owned `PrimitiveBlock`.
///
/// Delta coded ids, coordinates and member ids are resolved.
pub fn decode_primitive_block(pbf_block: &proto::PrimitiveBlock) -> io::Result<PrimitiveBlock> {
    let mut result = PrimitiveBlock {
        stringtable: string_table(&pbf_block.stringtable)?,
        ..Default::default()
    };

    let granularity = i64::from(pbf_block.granularity.unwrap_or(100));
    let lat_offset = pbf_block.lat_offset.unwrap_or(0);
    let lon_offset = pbf_block.lon_offset.unwrap_or(0);
    let to_degrees = |offset: i64, value: i64| {
        granularity
            .checked_mul(value)
            .and_then(|x| x.checked_add(offset))
            .map(|x| NANO_DEGREE * x as f64)
            .ok_or_else(|| invalid_data("invalid input data: coordinate out of range"))
    };

    for group in &pbf_block.primitivegroup {
        for node in &group.nodes {
            result.nodes.push(block::Node {
                id: node.id,
                lat: to_degrees(lat_offset, node.lat)?,
                lon: to_degrees(lon_offset, node.lon)?,
                tags: tags(&node.keys, &node.vals)?,
            });
        }

        if let Some(dense_nodes) = &group.dense {
            if dense_nodes.lat.len() != dense_nodes.id.len()
                || dense_nodes.lon.len() != dense_nodes.id.len()
            {
                return Err(invalid_data("invalid input data: malformed dense nodes"));
            }
            // deltas wrap around like the encoder's two's complement sums
            let (mut id, mut lat, mut lon) = (0i64, 0i64, 0i64);
            let mut keys_vals = dense_nodes.keys_vals.iter().map(|&x| x as u32);
            for i in 0..dense_nodes.id.len() {
                id = id.wrapping_add(dense_nodes.id[i]);
                lat = lat.wrapping_add(dense_nodes.lat[i]);
                lon = lon.wrapping_add(dense_nodes.lon[i]);

                let mut node_tags = Vec::new();
                // keys_vals is empty if no node in the block has tags
                while let Some(k) = keys_vals.next() {
                    if k == 0 {
                        break; // separator
                    }
                    let v = keys_vals
                        .next()
                        .ok_or_else(|| invalid_data("invalid input data: dangling tag key"))?;
                    node_tags.push((k, v));
                }

                result.nodes.push(block::Node {
                    id,
                    lat: to_degrees(lat_offset, lat)?,
                    lon: to_degrees(lon_offset, lon)?,
                    tags: node_tags,
                });
            }
        }

        for pbf_way in &group.ways {
            let mut node_ref = 0i64;
            let refs = pbf_way
                .refs
                .iter()
                .map(|&delta| {
                    node_ref = node_ref.wrapping_add(delta);
                    node_ref
                })
                .collect();
            result.ways.push(block::Way {
                id: pbf_way.id,
                refs,
                tags: tags(&pbf_way.keys, &pbf_way.vals)?,
            });
        }

        for pbf_relation in &group.relations {
            if pbf_relation.roles_sid.len() != pbf_relation.memids.len()
                || pbf_relation.memids.len() != pbf_relation.types.len()
            {
                return Err(invalid_data("invalid input data: malformed relation members"));
            }

            let mut memid = 0i64;
            let mut members = Vec::with_capacity(pbf_relation.memids.len());
            for i in 0..pbf_relation.memids.len() {
                memid = memid.wrapping_add(pbf_relation.memids[i]);
                let member_type = proto::relation::MemberType::from_i32(pbf_relation.types[i]);
                let member_type = match member_type {
                    Some(proto::relation::MemberType::Node) => MemberType::Node,
                    Some(proto::relation::MemberType::Way) => MemberType::Way,
                    Some(proto::relation::MemberType::Relation) => MemberType::Relation,
                    None => return Err(invalid_data("invalid input data: unknown member type")),
                };
                members.push(Member {
                    id: memid,
                    member_type,
                    role_idx: pbf_relation.roles_sid[i] as u32,
                });
            }

            result.relations.push(block::Relation {
                id: pbf_relation.id,
                members,
                tags: tags(&pbf_relation.keys, &pbf_relation.vals)?,
            });
        }
    }
    Ok(result)
}

fn check_header(header: &proto::HeaderBlock) -> io::Result<()> {
    debug!(
        "pbf header: writingprogram {:?}, source {:?}, optional features {:?}",
        header.writingprogram, header.source, header.optional_features
    );
    match header
        .required_features
        .iter()
        .find(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
    {
        Some(feature) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported required feature: {}", feature),
        )),
        None => Ok(()),
    }
}

/// Blocks of a pbf file, held in memory or memory mapped.
pub struct PbfSource<D> {
    data: D,
    index: Vec<(Contents, BlockIndex)>,
}

impl PbfSource<Mmap> {
    /// Memory maps and indexes the pbf file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let input_file = File::open(path)?;
        let input_data = unsafe { Mmap::map(&input_file)? };
        Self::from_data(input_data)
    }
}

impl<D: AsRef<[u8]> + Sync> PbfSource<D> {
    pub fn from_data(data: D) -> io::Result<Self> {
        let block_index = build_block_index(data.as_ref())?;
        let mut index = Vec::with_capacity(block_index.len());
        for idx in block_index {
            match idx.kind {
                BlockKind::Header => {
                    let header: proto::HeaderBlock = read_block(data.as_ref(), &idx)?;
                    check_header(&header)?;
                }
                BlockKind::Data(contents) => index.push((contents, idx)),
            }
        }
        Ok(Self { data, index })
    }
}

impl<D: AsRef<[u8]> + Sync> BlockSource for PbfSource<D> {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn contents(&self, idx: usize) -> Contents {
        self.index[idx].0
    }

    fn read_block(&self, idx: usize) -> io::Result<PrimitiveBlock> {
        let block: proto::PrimitiveBlock = read_block(self.data.as_ref(), &self.index[idx].1)?;
        decode_primitive_block(&block)
    }
}
