//! Keeps a viewer frame sized to the document rendered inside it.

use crate::scheduler::Probe;
use hp_core::PreviewError;
use hp_core::PreviewResult;
use log::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The frame being fitted, as seen from its embedder.
pub trait FrameSurface {
    fn frame_size(&self) -> Size;
    /// Scroll size of the rendered content. Fails once the frame is gone.
    fn content_size(&self) -> PreviewResult<Size>;
    fn resize_frame(&mut self, size: Size);
}

/// Probe that grows or shrinks the frame to its content, never narrower
/// than the document's viewport width.
#[derive(Debug)]
pub struct FrameFitter<S> {
    surface: S,
    min_width: u32,
    resizes: u64,
}

impl<S: FrameSurface> FrameFitter<S> {
    pub fn new(surface: S, min_width: u32) -> Self {
        Self {
            surface,
            min_width,
            resizes: 0,
        }
    }

    /// Uses a CSS pixel width such as `816px` as the minimum frame width.
    pub fn with_viewport_width(surface: S, viewport_width: &str) -> PreviewResult<Self> {
        Ok(Self::new(surface, parse_css_pixels(viewport_width)?))
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn min_width(&self) -> u32 {
        self.min_width
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }
}

impl<S: FrameSurface> Probe for FrameFitter<S> {
    fn sample(&mut self) -> PreviewResult<bool> {
        let content = self.surface.content_size()?;
        let target = Size::new(content.width.max(self.min_width), content.height);
        let current = self.surface.frame_size();
        if target == current {
            return Ok(false);
        }

        debug!(
            "resizing frame {}x{} -> {}x{}",
            current.width, current.height, target.width, target.height
        );
        self.surface.resize_frame(target);
        self.resizes += 1;
        Ok(true)
    }
}

/// Parses `816px`, `816` or `600.5px` into whole pixels, rounding up.
pub fn parse_css_pixels(value: &str) -> PreviewResult<u32> {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim_end();
    match number.parse::<f64>() {
        Ok(pixels) if (0.0..=f64::from(u32::MAX)).contains(&pixels) => {
            Ok(pixels.ceil() as u32)
        }
        _ => Err(PreviewError::new(
            "schedule.frame.invalid_width",
            format!("`{value}` is not a pixel width"),
        )),
    }
}
