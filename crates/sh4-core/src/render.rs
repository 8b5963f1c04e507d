//! Render sink interface.
//!
//! The emulated video hardware hands fully-resolved draw descriptors to a
//! [`RenderBackend`]; nothing the backend returns feeds back into guest
//! state except texture handles.

use std::collections::BTreeMap;

use tracing::trace;

/// Backend-assigned texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureHandle(pub u32);

/// Texel layout of uploaded texture data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit channels, host order.
    Rgba,
    /// 5-5-5-1 packed.
    Rgba5551,
    /// 5-6-5 packed.
    Rgb565,
    /// 4-4-4-4 packed.
    Rgba4444,
    /// 8-8-8-8 packed.
    Rgba8888,
}

impl PixelFormat {
    /// Bytes per texel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba | Self::Rgba8888 => 4,
            Self::Rgba5551 | Self::Rgb565 | Self::Rgba4444 => 2,
        }
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Point sampling.
    #[default]
    Nearest,
    /// Bilinear sampling.
    Bilinear,
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Tile.
    #[default]
    Repeat,
    /// Clamp to the border texel.
    ClampToEdge,
    /// Tile with every other repetition mirrored.
    MirroredRepeat,
}

/// Depth comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum DepthFunc {
    /// Depth testing disabled.
    #[default]
    None,
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum CullFace {
    #[default]
    None,
    Front,
    Back,
}

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum BlendFunc {
    /// Blending disabled.
    #[default]
    None,
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
}

/// How texture and vertex colour combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum ShadeMode {
    #[default]
    Decal,
    Modulate,
    DecalAlpha,
    ModulateAlpha,
}

/// Box drawing style for debug overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum BoxType {
    #[default]
    Bar,
    Flat,
}

/// 2D primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PrimType {
    #[default]
    Triangles,
    Lines,
}

/// Texture creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Texel layout of the upload.
    pub format: PixelFormat,
    /// Sampling filter.
    pub filter: FilterMode,
    /// Horizontal wrapping.
    pub wrap_u: WrapMode,
    /// Vertical wrapping.
    pub wrap_v: WrapMode,
    /// Generate a mip chain.
    pub mipmaps: bool,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl TextureDesc {
    /// Bytes a full upload of the base level occupies.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Transformed 3D vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Position.
    pub xyz: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
    /// Base colour, packed ARGB.
    pub color: u32,
    /// Offset (specular) colour, packed ARGB.
    pub offset_color: u32,
}

/// A run of vertices drawn with one render state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Surface {
    /// Bound texture, if any.
    pub texture: Option<TextureHandle>,
    /// Write depth.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_func: DepthFunc,
    /// Face culling.
    pub cull: CullFace,
    /// Source blend factor.
    pub src_blend: BlendFunc,
    /// Destination blend factor.
    pub dst_blend: BlendFunc,
    /// Texture/colour combine.
    pub shade: ShadeMode,
    /// Treat vertex alpha as opaque.
    pub ignore_alpha: bool,
    /// Treat texture alpha as opaque.
    pub ignore_texture_alpha: bool,
    /// Add the offset colour.
    pub offset_color: bool,
    /// Punch-through alpha test.
    pub pt_alpha_test: bool,
    /// Punch-through reference value.
    pub pt_alpha_ref: f32,
    /// First vertex of the run.
    pub first_vert: usize,
    /// Vertex count.
    pub num_verts: usize,
}

/// Screen-space vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex2D {
    /// Position in pixels.
    pub xy: [f32; 2],
    /// Texture coordinate.
    pub uv: [f32; 2],
    /// Colour, packed ARGB.
    pub color: u32,
}

/// Screen-space draw state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Surface2D {
    /// Topology.
    pub prim_type: PrimType,
    /// Bound texture, if any.
    pub texture: Option<TextureHandle>,
    /// Source blend factor.
    pub src_blend: BlendFunc,
    /// Destination blend factor.
    pub dst_blend: BlendFunc,
    /// Scissor rectangle as x, y, width, height.
    pub scissor: Option<[f32; 4]>,
    /// First vertex of the run.
    pub first_vert: usize,
    /// Vertex count.
    pub num_verts: usize,
}

/// Sink for frames produced by the emulated video hardware.
pub trait RenderBackend {
    /// Uploads a texture and returns its handle.
    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> TextureHandle;
    /// Releases a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Starts a frame.
    fn begin_frame(&mut self);
    /// Presents the frame.
    fn end_frame(&mut self);

    /// Binds the projection and vertex buffer for the following surfaces.
    fn begin_surfaces(&mut self, projection: &[f32; 16], vertices: &[Vertex]);
    /// Draws a run of the bound vertices.
    fn draw_surface(&mut self, surface: &Surface);
    /// Ends the 3D pass.
    fn end_surfaces(&mut self);

    /// Starts the screen-space pass.
    fn begin_ortho(&mut self);
    /// Draws screen-space primitives.
    fn draw_ortho(&mut self, vertices: &[Vertex2D], surface: &Surface2D);
    /// Ends the screen-space pass.
    fn end_ortho(&mut self);
}

/// Call observed by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Texture upload.
    CreateTexture(TextureHandle, TextureDesc),
    /// Texture release.
    DestroyTexture(TextureHandle),
    /// Frame start.
    BeginFrame,
    /// Frame present.
    EndFrame,
    /// Surface pass start with its vertex count.
    BeginSurfaces(usize),
    /// Surface draw.
    DrawSurface(Surface),
    /// Surface pass end.
    EndSurfaces,
    /// Ortho pass start.
    BeginOrtho,
    /// Ortho draw with its vertex count.
    DrawOrtho(usize, Surface2D),
    /// Ortho pass end.
    EndOrtho,
}

/// Backend that draws nothing and keeps a log of what it was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    textures: BTreeMap<TextureHandle, TextureDesc>,
    next_handle: u32,
    frames: u64,
    log: Vec<RenderCommand>,
    logging: bool,
}

impl HeadlessBackend {
    /// Creates a backend that only counts frames.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that also records every call.
    #[must_use]
    pub fn recording() -> Self {
        Self {
            logging: true,
            ..Self::default()
        }
    }

    /// Frames presented so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Live textures.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn log(&self) -> &[RenderCommand] {
        &self.log
    }

    fn record(&mut self, command: RenderCommand) {
        if self.logging {
            self.log.push(command);
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> TextureHandle {
        self.next_handle += 1;
        let handle = TextureHandle(self.next_handle);
        trace!(?handle, width = desc.width, height = desc.height, bytes = data.len(), "texture created");
        self.textures.insert(handle, *desc);
        self.record(RenderCommand::CreateTexture(handle, *desc));
        handle
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_some() {
            self.record(RenderCommand::DestroyTexture(handle));
        }
    }

    fn begin_frame(&mut self) {
        self.record(RenderCommand::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.frames += 1;
        self.record(RenderCommand::EndFrame);
    }

    fn begin_surfaces(&mut self, _projection: &[f32; 16], vertices: &[Vertex]) {
        self.record(RenderCommand::BeginSurfaces(vertices.len()));
    }

    fn draw_surface(&mut self, surface: &Surface) {
        self.record(RenderCommand::DrawSurface(*surface));
    }

    fn end_surfaces(&mut self) {
        self.record(RenderCommand::EndSurfaces);
    }

    fn begin_ortho(&mut self) {
        self.record(RenderCommand::BeginOrtho);
    }

    fn draw_ortho(&mut self, vertices: &[Vertex2D], surface: &Surface2D) {
        self.record(RenderCommand::DrawOrtho(vertices.len(), *surface));
    }

    fn end_ortho(&mut self) {
        self.record(RenderCommand::EndOrtho);
    }
}
