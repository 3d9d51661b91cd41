//! Owned RGBA8 pixel grid

use crate::{BYTES_PER_PIXEL, ResampleError, ResizeAlgorithm, resize};

/// Validate a raw buffer and return its (width, height) in pixels
pub(crate) fn source_dimensions(len: usize, stride: usize) -> Result<(usize, usize), ResampleError> {
    if stride == 0 || stride % BYTES_PER_PIXEL != 0 {
        return Err(ResampleError::InvalidStride(stride));
    }
    if len == 0 || len % stride != 0 {
        return Err(ResampleError::InconsistentBuffer { len, stride });
    }
    Ok((stride / BYTES_PER_PIXEL, len / stride))
}

/// Width x height RGBA8 buffer, row-major, stride = width * 4
///
/// Immutable once built: resampling produces a new grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap a raw buffer whose rows are `stride` bytes long
    pub fn new(data: Vec<u8>, stride: usize) -> Result<Self, ResampleError> {
        let (w, h) = source_dimensions(data.len(), stride)?;
        Ok(Self {
            width: w as u32,
            height: h as u32,
            data,
        })
    }

    /// Build a grid from explicit dimensions
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ResampleError> {
        if width == 0 || height == 0 {
            return Err(ResampleError::InvalidDimensions { width, height });
        }
        let stride = width as usize * BYTES_PER_PIXEL;
        if data.len() != stride * height as usize {
            return Err(ResampleError::InconsistentBuffer {
                len: data.len(),
                stride,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Grid filled with one color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, ResampleError> {
        let data = rgba.repeat(width as usize * height as usize);
        Self::from_rgba(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row length in bytes
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// One row of RGBA bytes
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// RGBA of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Resample into a new grid
    pub fn resized(
        &self,
        width: u32,
        height: u32,
        algorithm: ResizeAlgorithm,
    ) -> Result<PixelGrid, ResampleError> {
        let data = resize(&self.data, self.stride(), width, height, algorithm)?;
        Ok(PixelGrid {
            width,
            height,
            data,
        })
    }
}
