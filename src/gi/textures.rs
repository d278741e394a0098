use glam::UVec3;

use crate::gi::probe::GridExtent;
use crate::gi::NUM_CASCADES;
use crate::renderer::backend::{BackendError, ResourceAllocator, TextureDesc, TextureHandle};

/// Per-probe data stored in the cascade textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeChannel {
    /// Octahedral map of incoming light
    Radiance,
    /// Less averaged radiance used as a fallback by the tracer
    LightCache,
    /// Mean distance and mean squared distance to geometry
    Depth,
    /// Average irradiance, one texel per probe
    Average,
    /// Whether the probe sits inside geometry, one texel per probe
    Validity,
}

impl ProbeChannel {
    pub const ALL: [ProbeChannel; 5] = [
        ProbeChannel::Radiance,
        ProbeChannel::LightCache,
        ProbeChannel::Depth,
        ProbeChannel::Average,
        ProbeChannel::Validity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProbeChannel::Radiance => "probe_radiance",
            ProbeChannel::LightCache => "probe_light_cache",
            ProbeChannel::Depth => "probe_depth",
            ProbeChannel::Average => "probe_average",
            ProbeChannel::Validity => "probe_validity",
        }
    }

    /// Interior texels along one side of a probe's footprint.
    pub fn texels_per_probe(self) -> u32 {
        match self {
            ProbeChannel::Radiance => 8,
            ProbeChannel::LightCache => 13,
            ProbeChannel::Depth => 12,
            ProbeChannel::Average | ProbeChannel::Validity => 1,
        }
    }

    /// Filtered channels get a one texel border on each side so bilinear
    /// taps never bleed into the neighbouring probe.
    pub fn border(self) -> u32 {
        match self {
            ProbeChannel::Radiance | ProbeChannel::LightCache | ProbeChannel::Depth => 1,
            ProbeChannel::Average | ProbeChannel::Validity => 0,
        }
    }

    pub fn footprint(self) -> u32 {
        self.texels_per_probe() + 2 * self.border()
    }

    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            ProbeChannel::Radiance | ProbeChannel::LightCache | ProbeChannel::Average => {
                wgpu::TextureFormat::Rgba16Float
            }
            ProbeChannel::Depth => wgpu::TextureFormat::Rg32Float,
            ProbeChannel::Validity => wgpu::TextureFormat::R32Float,
        }
    }

    /// All cascades share one volume, stacked along Y. Each probe covers a
    /// footprint x footprint tile in XY and a single slice in Z.
    pub fn resolution(self, extent: GridExtent) -> UVec3 {
        let footprint = self.footprint();
        let size = extent.size();
        UVec3::new(
            size.x * footprint,
            size.y * NUM_CASCADES as u32 * footprint,
            size.z,
        )
    }
}

/// One texture per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTextureSet {
    handles: [TextureHandle; 5],
}

impl ProbeTextureSet {
    pub fn create<A: ResourceAllocator + ?Sized>(
        allocator: &mut A,
        extent: GridExtent,
        suffix: &str,
    ) -> Result<Self, BackendError> {
        let mut handles = Vec::with_capacity(ProbeChannel::ALL.len());
        for channel in ProbeChannel::ALL {
            let desc = TextureDesc::volume(
                format!("{}_{}", channel.label(), suffix),
                channel.format(),
                channel.resolution(extent),
            );
            handles.push(allocator.create_texture(&desc)?);
        }

        Ok(Self {
            handles: [handles[0], handles[1], handles[2], handles[3], handles[4]],
        })
    }

    pub fn get(&self, channel: ProbeChannel) -> TextureHandle {
        self.handles[channel as usize]
    }

    pub fn handles(&self) -> &[TextureHandle] {
        &self.handles
    }

    pub fn destroy<A: ResourceAllocator + ?Sized>(self, allocator: &mut A) {
        for handle in self.handles {
            allocator.destroy_texture(handle);
        }
    }
}

/// Front/back pair. Passes read the front set; the cascade copy writes the
/// back set, which then becomes the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTextures {
    front: ProbeTextureSet,
    back: ProbeTextureSet,
}

impl ProbeTextures {
    pub fn create<A: ResourceAllocator + ?Sized>(
        allocator: &mut A,
        extent: GridExtent,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            front: ProbeTextureSet::create(allocator, extent, "a")?,
            back: ProbeTextureSet::create(allocator, extent, "b")?,
        })
    }

    pub fn front(&self) -> &ProbeTextureSet {
        &self.front
    }

    pub fn back(&self) -> &ProbeTextureSet {
        &self.back
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    pub fn destroy<A: ResourceAllocator + ?Sized>(self, allocator: &mut A) {
        self.front.destroy(allocator);
        self.back.destroy(allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::RecordingBackend;

    #[test]
    fn footprints_include_border() {
        assert_eq!(ProbeChannel::Radiance.footprint(), 10);
        assert_eq!(ProbeChannel::LightCache.footprint(), 15);
        assert_eq!(ProbeChannel::Depth.footprint(), 14);
        assert_eq!(ProbeChannel::Average.footprint(), 1);
        assert_eq!(ProbeChannel::Validity.footprint(), 1);
    }

    #[test]
    fn resolution_scales_grid_by_footprint() {
        let extent = GridExtent::new(32, 8);
        assert_eq!(
            ProbeChannel::Radiance.resolution(extent),
            UVec3::new(320, 320, 32)
        );
        assert_eq!(
            ProbeChannel::Depth.resolution(extent),
            UVec3::new(448, 448, 32)
        );
        assert_eq!(
            ProbeChannel::Validity.resolution(extent),
            UVec3::new(32, 32, 32)
        );
    }

    #[test]
    fn channel_indices_match_handle_order() {
        for (index, channel) in ProbeChannel::ALL.iter().enumerate() {
            assert_eq!(*channel as usize, index);
        }
    }

    #[test]
    fn swap_exchanges_whole_sets() {
        let mut backend = RecordingBackend::new();
        let mut textures = ProbeTextures::create(&mut backend, GridExtent::new(4, 2)).unwrap();
        let front = *textures.front();
        let back = *textures.back();

        textures.swap();

        assert_eq!(*textures.front(), back);
        assert_eq!(*textures.back(), front);
        assert_eq!(backend.live_texture_count(), 10);
        assert_eq!(
            backend.texture_desc(front.get(ProbeChannel::Depth)).unwrap().label,
            "probe_depth_a"
        );

        textures.destroy(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
    }
}
