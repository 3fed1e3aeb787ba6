//! Demo resource kinds.
//!
//! Stand-ins for what a renderer would register: a device-bound texture and
//! a plain CPU-side font. They allocate byte buffers instead of talking to a
//! graphics API so the host can run anywhere.
//!
//! Manifest syntax:
//!
//! ```text
//! texture "Name" [LOAD|LOCK] "path" width height ;
//! font    "Name" [LOAD|LOCK] "face" size [bold] ;
//! ```

use engine_resources::decl::Params;
use engine_resources::device::{DeviceBound, DeviceResource};
use engine_resources::error::ResourceError;
use engine_resources::registry::ResourceRegistry;
use engine_resources::resource::{DeviceStatus, Resource};
use tracing::debug;

pub const TEXTURE: &str = "texture";
pub const FONT: &str = "font";

// =============================================================================
// Texture
// =============================================================================

/// RGBA texture with a managed (system memory) copy and a video memory copy.
#[derive(Debug)]
pub struct Texture {
    pub path: String,
    pub width: u32,
    pub height: u32,
    managed: Vec<u8>,
    video: Vec<u8>,
}

impl Texture {
    /// Largest accepted width or height.
    pub const MAX_DIMENSION: u32 = 16_384;

    pub fn new(path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            managed: Vec::new(),
            video: Vec::new(),
        }
    }

    fn byte_len(&self) -> anyhow::Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|texels| texels.checked_mul(4))
            .ok_or_else(|| anyhow::anyhow!("texture {}x{} is too large", self.width, self.height))
    }

    pub fn managed_bytes(&self) -> usize {
        self.managed.len()
    }

    pub fn video_bytes(&self) -> usize {
        self.video.len()
    }

    fn parse(params: &mut Params) -> anyhow::Result<Self> {
        let path = params.expect_string()?;
        let width = params.expect_u32()?;
        let height = params.expect_u32()?;
        let valid = 1..=Self::MAX_DIMENSION;
        if !valid.contains(&width) || !valid.contains(&height) {
            return Err(params
                .error(format!(
                    "texture dimensions must be within 1..={}",
                    Self::MAX_DIMENSION
                ))
                .into());
        }
        params.finish()?;
        Ok(Self::new(path, width, height))
    }
}

impl DeviceResource for Texture {
    fn on_device_create(&mut self) -> anyhow::Result<()> {
        self.managed = vec![0; self.byte_len()?];
        debug!(path = %self.path, bytes = self.managed.len(), "texture created");
        Ok(())
    }

    fn on_device_destroy(&mut self) -> anyhow::Result<()> {
        self.managed = Vec::new();
        Ok(())
    }

    fn on_device_restore(&mut self) -> anyhow::Result<()> {
        self.video = self.managed.clone();
        Ok(())
    }

    fn on_device_invalidate(&mut self) -> anyhow::Result<()> {
        self.video = Vec::new();
        Ok(())
    }
}

// =============================================================================
// Font
// =============================================================================

/// Bitmap font; glyph advances are built on load.
#[derive(Debug)]
pub struct Font {
    pub face: String,
    pub size: u32,
    pub bold: bool,
    advances: Vec<u32>,
}

impl Font {
    /// Printable ASCII.
    const GLYPHS: u32 = 95;

    pub fn new(face: impl Into<String>, size: u32, bold: bool) -> Self {
        Self {
            face: face.into(),
            size,
            bold,
            advances: Vec::new(),
        }
    }

    pub fn is_built(&self) -> bool {
        !self.advances.is_empty()
    }

    /// Horizontal advance of `c`, if the font is loaded and has the glyph.
    pub fn advance(&self, c: char) -> Option<u32> {
        let index = (c as u32).checked_sub(' ' as u32)?;
        self.advances.get(index as usize).copied()
    }

    fn parse(params: &mut Params) -> anyhow::Result<Self> {
        let face = params.expect_string()?;
        let size = params.expect_u32()?;
        let bold = params.try_keyword("bold");
        params.finish()?;
        Ok(Self::new(face, size, bold))
    }
}

impl Resource for Font {
    fn on_load(&mut self, _device: DeviceStatus) -> anyhow::Result<()> {
        if self.size == 0 {
            anyhow::bail!("font `{}` has zero size", self.face);
        }
        let base = self.size / 2 + u32::from(self.bold);
        self.advances = (0..Self::GLYPHS)
            .map(|g| if g == 0 { base } else { base + g % 3 })
            .collect();
        Ok(())
    }

    fn on_unload(&mut self) -> anyhow::Result<()> {
        self.advances = Vec::new();
        Ok(())
    }
}

/// Registers the demo kinds.
pub fn register_demo_types(registry: &mut ResourceRegistry) -> Result<(), ResourceError> {
    registry.register_type(TEXTURE, |_name, _group, params| {
        Ok(Box::new(DeviceBound::new(Texture::parse(params)?)) as Box<dyn Resource>)
    })?;
    registry.register_type(FONT, |_name, _group, params| {
        Ok(Box::new(Font::parse(params)?) as Box<dyn Resource>)
    })?;
    Ok(())
}
