//! Host memory standing in for device memory.

use std::collections::{HashMap, HashSet};

use super::layout::ImageLayout;
use super::pipeline_cache::PipelineCacheStore;
use crate::barrier::Subresource;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::NativeHandle;
use crate::pipeline::PipelineType;
use crate::query::QueryType;
use crate::types::{ClearValue, Extent3d, QueueType, ResourceState, TextureDesc, TextureFormat};

#[derive(Debug)]
pub(super) struct BufferMemory {
    pub(super) name: Option<String>,
    pub(super) data: Vec<u8>,
}

/// A texture stored as one tightly packed byte vector per subresource.
///
/// Subresource `(mip, layer)` lives at index `layer * mip_levels + mip`.
#[derive(Debug)]
pub(super) struct TextureMemory {
    pub(super) name: Option<String>,
    pub(super) format: TextureFormat,
    pub(super) extent: Extent3d,
    pub(super) mip_levels: u32,
    pub(super) array_size: u32,
    pub(super) subresources: Vec<Vec<u8>>,
    pub(super) layouts: Vec<ImageLayout>,
}

impl TextureMemory {
    pub(super) fn new(desc: &TextureDesc) -> GraphicsResult<Self> {
        let extent = desc.extent();
        let block = desc.format.block_size() as u64;
        let mip_levels = desc.mip_levels.max(1);
        let array_size = desc.array_size.max(1);
        let initial = ImageLayout::from_state(desc.start_state, desc.format.is_depth_stencil());

        let mut subresources = Vec::with_capacity((mip_levels * array_size) as usize);
        for _layer in 0..array_size {
            for mip in 0..mip_levels {
                let bytes = extent.mip_level(mip).texel_count() * block;
                let bytes = usize::try_from(bytes).map_err(|_| GraphicsError::OutOfMemory)?;
                subresources.push(vec![0; bytes]);
            }
        }
        Ok(Self {
            name: desc.name.clone(),
            format: desc.format,
            extent,
            mip_levels,
            array_size,
            layouts: vec![initial; subresources.len()],
            subresources,
        })
    }

    pub(super) fn index(&self, mip_level: u32, array_layer: u32) -> Option<usize> {
        (mip_level < self.mip_levels && array_layer < self.array_size)
            .then_some((array_layer * self.mip_levels + mip_level) as usize)
    }

    /// Indices covered by a barrier or attachment on `subresource` (all when `None`).
    pub(super) fn indices(&self, subresource: Option<Subresource>) -> Vec<usize> {
        match subresource {
            Some(sub) => self.index(sub.mip_level, sub.array_layer).into_iter().collect(),
            None => (0..self.subresources.len()).collect(),
        }
    }

    pub(super) fn is_depth(&self) -> bool {
        self.format.is_depth_stencil()
    }

    /// Fill one subresource with `value` encoded in the texture format.
    pub(super) fn clear(&mut self, index: usize, value: ClearValue) {
        let texel = encode_texel(self.format, value);
        if texel.is_empty() {
            return;
        }
        if let Some(bytes) = self.subresources.get_mut(index) {
            for chunk in bytes.chunks_exact_mut(texel.len()) {
                chunk.copy_from_slice(&texel);
            }
        }
    }
}

#[derive(Debug)]
pub(super) struct QueryPoolMemory {
    pub(super) query_type: QueryType,
    pub(super) results: Vec<u64>,
    /// Vertex counter value at `begin_query`, per open query.
    pub(super) open: HashMap<u32, u64>,
}

impl QueryPoolMemory {
    pub(super) fn new(query_type: QueryType, count: u32) -> Self {
        Self {
            query_type,
            results: vec![0; count as usize],
            open: HashMap::new(),
        }
    }
}

/// Key of a split barrier waiting for its end half.
pub(super) type SplitKey = (NativeHandle, Option<Subresource>);

/// Everything the software device owns, behind one lock.
#[derive(Debug, Default)]
pub(super) struct ResourceStore {
    pub(super) buffers: HashMap<NativeHandle, BufferMemory>,
    pub(super) textures: HashMap<NativeHandle, TextureMemory>,
    pub(super) samplers: HashSet<NativeHandle>,
    pub(super) pipelines: HashMap<NativeHandle, PipelineType>,
    pub(super) caches: HashMap<NativeHandle, PipelineCacheStore>,
    pub(super) query_pools: HashMap<NativeHandle, QueryPoolMemory>,
    /// Split transitions begun and not yet ended: `(current, new)`.
    pub(super) pending_splits: HashMap<SplitKey, (ResourceState, ResourceState)>,
    /// Resources released to another queue type and not yet acquired.
    pub(super) in_transfer: HashMap<NativeHandle, QueueType>,
}

impl ResourceStore {
    pub(super) fn buffer(&self, handle: NativeHandle, op: &str) -> GraphicsResult<&BufferMemory> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| GraphicsError::Internal(format!("{op}: unknown buffer {handle:?}")))
    }

    pub(super) fn buffer_mut(&mut self, handle: NativeHandle, op: &str) -> GraphicsResult<&mut BufferMemory> {
        self.buffers
            .get_mut(&handle)
            .ok_or_else(|| GraphicsError::Internal(format!("{op}: unknown buffer {handle:?}")))
    }

    pub(super) fn texture_mut(&mut self, handle: NativeHandle, op: &str) -> GraphicsResult<&mut TextureMemory> {
        self.textures
            .get_mut(&handle)
            .ok_or_else(|| GraphicsError::Internal(format!("{op}: unknown texture {handle:?}")))
    }

    pub(super) fn query_pool_mut(&mut self, handle: NativeHandle, op: &str) -> GraphicsResult<&mut QueryPoolMemory> {
        self.query_pools
            .get_mut(&handle)
            .ok_or_else(|| GraphicsError::Internal(format!("{op}: unknown query pool {handle:?}")))
    }

    /// Bytes `offset..offset + size` of a buffer.
    pub(super) fn read_buffer(&self, handle: NativeHandle, offset: u64, size: u64, op: &str) -> GraphicsResult<&[u8]> {
        let buffer = self.buffer(handle, op)?;
        let range = checked_range(offset, size, buffer.data.len(), op)?;
        Ok(&buffer.data[range])
    }

    pub(super) fn write_buffer(&mut self, handle: NativeHandle, offset: u64, data: &[u8], op: &str) -> GraphicsResult<()> {
        let buffer = self.buffer_mut(handle, op)?;
        let range = checked_range(offset, data.len() as u64, buffer.data.len(), op)?;
        buffer.data[range].copy_from_slice(data);
        Ok(())
    }
}

/// `offset..offset + size` as a byte range, if it fits in `len`.
pub(super) fn checked_range(offset: u64, size: u64, len: usize, op: &str) -> GraphicsResult<std::ops::Range<usize>> {
    offset
        .checked_add(size)
        .filter(|&end| end <= len as u64)
        .map(|end| offset as usize..end as usize)
        .ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("{op}: range {offset}+{size} exceeds {len} bytes"))
        })
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn unorm16(v: f32) -> [u8; 2] {
    ((v.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes()
}

fn srgb8(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let encoded = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    unorm8(encoded)
}

fn f16(v: f32) -> [u8; 2] {
    half::f16::from_f32(v).to_le_bytes()
}

/// Encode one texel of `format`. Empty for formats without a byte layout.
pub(super) fn encode_texel(format: TextureFormat, value: ClearValue) -> Vec<u8> {
    let [r, g, b, a] = value.as_rgba();
    match format {
        TextureFormat::Undefined => Vec::new(),
        TextureFormat::R8Unorm => vec![unorm8(r)],
        TextureFormat::R8Uint => vec![r.clamp(0.0, 255.0) as u8],
        TextureFormat::R16Unorm => unorm16(r).to_vec(),
        TextureFormat::R16Float => f16(r).to_vec(),
        TextureFormat::Rg8Unorm => vec![unorm8(r), unorm8(g)],
        TextureFormat::R32Float => r.to_le_bytes().to_vec(),
        TextureFormat::R32Uint => (r.max(0.0) as u32).to_le_bytes().to_vec(),
        TextureFormat::Rg16Float => [f16(r), f16(g)].concat(),
        TextureFormat::Rgba8Unorm => vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)],
        TextureFormat::Rgba8UnormSrgb => vec![srgb8(r), srgb8(g), srgb8(b), unorm8(a)],
        TextureFormat::Bgra8Unorm => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        TextureFormat::Bgra8UnormSrgb => vec![srgb8(b), srgb8(g), srgb8(r), unorm8(a)],
        TextureFormat::Rgb10a2Unorm => {
            let c10 = |v: f32| (v.clamp(0.0, 1.0) * 1023.0).round() as u32;
            let a2 = (a.clamp(0.0, 1.0) * 3.0).round() as u32;
            (c10(r) | c10(g) << 10 | c10(b) << 20 | a2 << 30).to_le_bytes().to_vec()
        }
        TextureFormat::Rgba16Float => [f16(r), f16(g), f16(b), f16(a)].concat(),
        TextureFormat::Rg32Float => [r.to_le_bytes(), g.to_le_bytes()].concat(),
        TextureFormat::Rgba32Float => [r.to_le_bytes(), g.to_le_bytes(), b.to_le_bytes(), a.to_le_bytes()].concat(),
        TextureFormat::Depth16Unorm => unorm16(r).to_vec(),
        TextureFormat::Depth24UnormStencil8 => {
            let depth = (r.clamp(0.0, 1.0) * 16_777_215.0).round() as u32;
            (depth | (g as u32 & 0xff) << 24).to_le_bytes().to_vec()
        }
        TextureFormat::Depth32Float => r.to_le_bytes().to_vec(),
        TextureFormat::Depth32FloatStencil8 => {
            let mut bytes = r.to_le_bytes().to_vec();
            bytes.extend_from_slice(&(g as u32 & 0xff).to_le_bytes());
            bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_texel_sizes_match_block_size() {
        let formats = [
            TextureFormat::R8Unorm,
            TextureFormat::R16Float,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgb10a2Unorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float,
            TextureFormat::Depth24UnormStencil8,
            TextureFormat::Depth32FloatStencil8,
        ];
        for format in formats {
            let texel = encode_texel(format, ClearValue::color(0.5, 0.5, 0.5, 1.0));
            assert_eq!(texel.len() as u32, format.block_size(), "{format:?}");
        }
    }

    #[test]
    fn test_encode_bgra_swizzle() {
        let texel = encode_texel(TextureFormat::Bgra8Unorm, ClearValue::color(1.0, 0.0, 0.0, 1.0));
        assert_eq!(texel, vec![0, 0, 255, 255]);
        let depth = encode_texel(TextureFormat::Depth32Float, ClearValue::depth_stencil(1.0, 0));
        assert_eq!(depth, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_texture_subresources() {
        let desc = TextureDesc::new_2d(8, 4, TextureFormat::Rgba8Unorm)
            .with_mip_levels(2)
            .with_array_size(3)
            .with_start_state(ResourceState::COPY_DEST);
        let mut texture = TextureMemory::new(&desc).unwrap();
        assert_eq!(texture.subresources.len(), 6);
        assert_eq!(texture.subresources[0].len(), 8 * 4 * 4);
        assert_eq!(texture.subresources[1].len(), 4 * 2 * 4);
        assert!(texture.layouts.iter().all(|&l| l == ImageLayout::TransferDst));
        assert_eq!(texture.index(1, 2), Some(5));
        assert_eq!(texture.index(2, 0), None);
        assert_eq!(
            texture.indices(Some(Subresource {
                mip_level: 0,
                array_layer: 1
            })),
            vec![2]
        );

        texture.clear(0, ClearValue::color(0.0, 1.0, 0.0, 1.0));
        assert_eq!(&texture.subresources[0][..4], &[0, 255, 0, 255]);
        assert!(texture.subresources[1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(4, 4, 8, "t").unwrap(), 4..8);
        assert!(checked_range(4, 5, 8, "t").is_err());
        assert!(checked_range(u64::MAX, 2, 8, "t").is_err());
    }
}
