//! Image buffers, borrowed views and low-level image operations.
//!
//! [`Image`] owns an interleaved byte buffer with 1, 3 or 4 channels in
//! BGR(A) order. [`ImageView`] is a borrowed 2D view with an explicit row
//! stride in bytes; ROI slices are zero-copy views into the same backing
//! slice and keep the parent stride. Algorithms work on single-channel
//! [`Plane`] buffers.

use crate::shapes::Rectangle;
use crate::util::{MoonRegError, MoonRegResult};

pub mod convert;
pub mod filter;
#[cfg(feature = "image-io")]
pub mod io;
pub mod plane;
pub mod pyramid;
pub mod resize;

pub use plane::Plane;

/// Validates a channel count (gray, BGR or BGRA).
pub(crate) fn check_channels(channels: usize) -> MoonRegResult<()> {
    match channels {
        1 | 3 | 4 => Ok(()),
        _ => Err(MoonRegError::InvalidChannels { channels }),
    }
}

/// Owned interleaved 8-bit image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    width: usize,
    height: usize,
    channels: usize,
}

impl Image {
    /// Wraps an interleaved buffer; `data.len()` must equal
    /// `width * height * channels`.
    pub fn new(data: Vec<u8>, width: usize, height: usize, channels: usize) -> MoonRegResult<Self> {
        check_channels(channels)?;
        let needed = packed_len(width, height, channels)?;
        if data.len() < needed {
            return Err(MoonRegError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(MoonRegError::InvalidInput(
                "buffer length does not match width * height * channels",
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Creates a zero-filled image.
    pub fn zeros(width: usize, height: usize, channels: usize) -> MoonRegResult<Self> {
        check_channels(channels)?;
        let len = packed_len(width, height, channels)?;
        Ok(Self {
            data: vec![0; len],
            width,
            height,
            channels,
        })
    }

    /// Builds an image by inferring the channel count from the buffer length,
    /// falling back to 4 channels when the length is ambiguous.
    pub fn from_raw_infer(data: Vec<u8>, width: usize, height: usize) -> MoonRegResult<Self> {
        let pixels = width
            .checked_mul(height)
            .filter(|&p| p > 0)
            .ok_or(MoonRegError::InvalidDimensions { width, height })?;
        let channels = match data.len() / pixels {
            c @ (1 | 3 | 4) if data.len() % pixels == 0 => c,
            _ => 4,
        };
        Self::new(data, width, height, channels)
    }

    /// Wraps a grayscale plane as a single-channel image.
    pub fn from_plane(plane: Plane<u8>) -> MoonRegResult<Self> {
        let (width, height) = (plane.width(), plane.height());
        Self::new(plane.into_vec(), width, height, 1)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns `(width, height)`.
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns the channel values of pixel `(x, y)`.
    ///
    /// # Panics
    /// Panics when `(x, y)` lies outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Mutable access to pixel `(x, y)`.
    ///
    /// # Panics
    /// Panics when `(x, y)` lies outside the image.
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [u8] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let start = (y * self.width + x) * self.channels;
        &mut self.data[start..start + self.channels]
    }

    /// Returns a borrowed view of the whole image.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            channels: self.channels,
            stride: self.width * self.channels,
        }
    }

    /// Copies the region `[tl, br)` described by `rect`.
    pub fn crop(&self, rect: &Rectangle) -> MoonRegResult<Image> {
        if rect.top_left_x < 0
            || rect.top_left_y < 0
            || rect.bottom_right_x <= rect.top_left_x
            || rect.bottom_right_y <= rect.top_left_y
        {
            return Err(MoonRegError::InvalidInput("crop rectangle is empty or negative"));
        }
        let x = rect.top_left_x as usize;
        let y = rect.top_left_y as usize;
        let width = (rect.bottom_right_x - rect.top_left_x) as usize;
        let height = (rect.bottom_right_y - rect.top_left_y) as usize;
        self.view().roi(x, y, width, height)?.to_image()
    }

    /// Converts to a grayscale plane (BT.601 luma for colour images).
    pub fn to_gray(&self) -> Plane<u8> {
        convert::to_gray(self)
    }

    /// Converts to the requested channel count.
    pub fn to_channels(&self, channels: usize) -> MoonRegResult<Image> {
        convert::convert_channels(self, channels)
    }

    /// Resizes with bilinear sampling (box pre-reduction for strong shrinks).
    pub fn resize(&self, width: usize, height: usize) -> MoonRegResult<Image> {
        resize::resize_image(self, width, height)
    }
}

/// Borrowed interleaved image view with an explicit stride in bytes.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    channels: usize,
    stride: usize,
}

impl<'a> ImageView<'a> {
    /// Creates a contiguous view with `stride == width * channels`.
    pub fn from_slice(
        data: &'a [u8],
        width: usize,
        height: usize,
        channels: usize,
    ) -> MoonRegResult<Self> {
        Self::new(data, width, height, channels, width.saturating_mul(channels))
    }

    /// Creates a view with an explicit stride (bytes between row starts).
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        channels: usize,
        stride: usize,
    ) -> MoonRegResult<Self> {
        check_channels(channels)?;
        let needed = required_len(width, height, channels, stride)?;
        if data.len() < needed {
            return Err(MoonRegError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the stride in bytes between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the channel values at `(x, y)` if within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a [u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = y
            .checked_mul(self.stride)?
            .checked_add(x.checked_mul(self.channels)?)?;
        self.data.get(start..start + self.channels)
    }

    /// Returns row `y` as `width * channels` bytes.
    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width * self.channels)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> MoonRegResult<ImageView<'a>> {
        if width == 0 || height == 0 {
            return Err(MoonRegError::InvalidDimensions { width, height });
        }
        let out_of_bounds = MoonRegError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y * self.stride + x * self.channels;
        let data = self.data.get(start..).ok_or(MoonRegError::BufferTooSmall {
            needed: start.saturating_add(1),
            got: self.data.len(),
        })?;
        ImageView::new(data, width, height, self.channels, self.stride)
    }

    /// Copies the view into a contiguous owned image.
    pub fn to_image(&self) -> MoonRegResult<Image> {
        let row_len = self.width * self.channels;
        let mut data = Vec::with_capacity(row_len * self.height);
        for y in 0..self.height {
            let row = self.row(y).ok_or(MoonRegError::BufferTooSmall {
                needed: y * self.stride + row_len,
                got: self.data.len(),
            })?;
            data.extend_from_slice(row);
        }
        Image::new(data, self.width, self.height, self.channels)
    }
}

fn packed_len(width: usize, height: usize, channels: usize) -> MoonRegResult<usize> {
    if width == 0 || height == 0 {
        return Err(MoonRegError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(channels))
        .ok_or(MoonRegError::InvalidDimensions { width, height })
}

fn required_len(width: usize, height: usize, channels: usize, stride: usize) -> MoonRegResult<usize> {
    if width == 0 || height == 0 {
        return Err(MoonRegError::InvalidDimensions { width, height });
    }
    let row_len = width
        .checked_mul(channels)
        .ok_or(MoonRegError::InvalidDimensions { width, height })?;
    if stride < row_len {
        return Err(MoonRegError::InvalidStride {
            width: row_len,
            stride,
        });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(row_len))
        .ok_or(MoonRegError::InvalidDimensions { width, height })
}
