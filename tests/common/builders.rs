//! Test data builders for formats and chains

use super::mock_helpers::{FixedSource, RecordingFilter, StageLog};
use framechain::pipeline::{Chain, PixelFormat, Unit, UnitFormat};

/// Builder for creating test formats
pub struct FormatBuilder {
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    name: Option<String>,
}

impl FormatBuilder {
    pub fn new() -> Self {
        Self {
            pixel_format: PixelFormat::Gray8,
            width: 640,
            height: 480,
            name: None,
        }
    }

    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn build(self) -> UnitFormat {
        let format = UnitFormat::new(self.pixel_format, self.width, self.height)
            .expect("test format has non-zero size");
        match self.name {
            Some(name) => UnitFormat::with_layout(
                self.pixel_format,
                Some(&name),
                self.width,
                self.height,
                format.row_stride,
                format.max_data_size,
            )
            .expect("test format layout is valid"),
            None => format,
        }
    }
}

/// `F1` from the usual scenarios: 640x480 Gray8
pub fn gray_vga() -> UnitFormat {
    FormatBuilder::new().build()
}

/// A chain built from a source followed by recording filters
pub struct TestChain {
    pub chain: Chain,
    pub source: Unit,
    pub filters: Vec<(Unit, StageLog)>,
}

impl TestChain {
    /// Source offering `formats`, then `filters` recording filters.
    pub fn new(formats: Vec<UnitFormat>, filters: usize) -> Self {
        let mut chain = Chain::new();
        let source = FixedSource::unit("A", formats);
        chain.add_unit(source.clone()).expect("source joins chain");
        let filters = (0..filters)
            .map(|i| {
                let (unit, log) = RecordingFilter::unit(&format!("F{}", i));
                chain.add_unit(unit.clone()).expect("filter joins chain");
                (unit, log)
            })
            .collect();
        Self {
            chain,
            source,
            filters,
        }
    }

    pub fn filter(&self, index: usize) -> &Unit {
        &self.filters[index].0
    }

    pub fn log(&self, index: usize) -> &StageLog {
        &self.filters[index].1
    }

    /// Forget notifications recorded so far.
    pub fn reset_logs(&self) {
        for (_, log) in &self.filters {
            log.reset();
        }
    }
}
