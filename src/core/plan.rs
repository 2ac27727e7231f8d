// slicekit/src/core/plan.rs
use super::{OutputFormat, ResizeAlgorithm, Result, SliceKitError};
use crate::utils::sanitize_filename;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Where to cut an image, top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutPlan {
    /// Explicit row offsets, strictly increasing.
    Offsets(Vec<u32>),
    /// A cut every `n` rows.
    Interval(u32),
    /// `n` evenly spaced cuts, giving `n + 1` slices.
    Count(u32),
}

impl CutPlan {
    /// Parses a comma separated offset list such as `"1200, 2400,3600"`.
    pub fn parse_offsets(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(SliceKitError::InvalidCutPlan(
                "No cut positions given".to_string(),
            ));
        }

        let offsets = compact
            .split(',')
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<u32>().map_err(|_| {
                    SliceKitError::InvalidCutPlan(format!("Not a pixel offset: {}", item))
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        let plan = CutPlan::Offsets(offsets);
        plan.validate()?;
        Ok(plan)
    }

    /// Checks the plan on its own, before any image is opened.
    pub fn validate(&self) -> Result<()> {
        match self {
            CutPlan::Offsets(offsets) => {
                if offsets.is_empty() {
                    return Err(SliceKitError::InvalidCutPlan(
                        "No cut positions given".to_string(),
                    ));
                }
                if let Some(pair) = offsets.windows(2).find(|w| w[0] >= w[1]) {
                    return Err(SliceKitError::InvalidCutPlan(format!(
                        "Cut positions must be strictly increasing ({} then {})",
                        pair[0], pair[1]
                    )));
                }
                Ok(())
            }
            CutPlan::Interval(0) => Err(SliceKitError::InvalidCutPlan(
                "Interval must be greater than 0".to_string(),
            )),
            CutPlan::Count(0) => Err(SliceKitError::InvalidCutPlan(
                "Cut count must be greater than 0".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Concrete cut offsets for an image of the given height.
    pub fn resolve(&self, height: u32) -> Result<Vec<u32>> {
        self.validate()?;

        match *self {
            CutPlan::Offsets(ref offsets) => {
                if let Some(bad) = offsets.iter().find(|&&p| p == 0 || p >= height) {
                    return Err(SliceKitError::InvalidCutPlan(format!(
                        "Cut position {} is outside the image (height {})",
                        bad, height
                    )));
                }
                Ok(offsets.clone())
            }
            CutPlan::Interval(interval) => {
                if interval >= height {
                    return Err(SliceKitError::InvalidCutPlan(format!(
                        "Interval {} is not smaller than the image height {}",
                        interval, height
                    )));
                }
                Ok((interval..height).step_by(interval as usize).collect())
            }
            CutPlan::Count(count) => {
                let step = count.checked_add(1).map_or(0, |slices| height / slices);
                if step == 0 {
                    return Err(SliceKitError::InvalidCutPlan(format!(
                        "Cannot make {} cuts in an image {} pixels high",
                        count, height
                    )));
                }
                Ok((1..=count).map(|i| step * i).collect())
            }
        }
    }

    /// Row ranges of the resulting slices. They cover `0..height` without gaps.
    pub fn segments(&self, height: u32) -> Result<Vec<Range<u32>>> {
        let offsets = self.resolve(height)?;
        let mut bounds = Vec::with_capacity(offsets.len() + 2);
        bounds.push(0);
        bounds.extend(offsets);
        bounds.push(height);

        Ok(bounds.windows(2).map(|w| w[0]..w[1]).collect())
    }
}

/// Naming of the files a split produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceNaming {
    pub base_name: Option<String>,
    pub digits: usize,
    pub version: u32,
}

impl Default for SliceNaming {
    fn default() -> Self {
        Self {
            base_name: None,
            digits: 3,
            version: 0,
        }
    }
}

impl SliceNaming {
    pub fn base_for(&self, source: &Path) -> String {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");

        match self.base_name.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => {
                let cleaned = sanitize_filename(custom);
                if cleaned.is_empty() {
                    stem.to_string()
                } else {
                    cleaned
                }
            }
            _ => stem.to_string(),
        }
    }

    /// Same numbering, fixed base name.
    pub fn with_base(&self, base: impl Into<String>) -> Self {
        Self {
            base_name: Some(base.into()),
            ..self.clone()
        }
    }

    pub fn file_name(&self, source: &Path, index: usize, format: OutputFormat) -> String {
        let base = self.base_for(source);
        let digits = self.digits;
        if self.version == 0 {
            format!("{}_{:0digits$}.{}", base, index, format.extension())
        } else {
            format!(
                "{}_v{:03}_{:0digits$}.{}",
                base,
                self.version,
                index,
                format.extension()
            )
        }
    }
}

/// Caller-ordered list of images to stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOrder {
    paths: Vec<PathBuf>,
    allow_duplicates: bool,
}

impl MergeOrder {
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        Self::build(paths, false)
    }

    pub fn with_duplicates(paths: Vec<PathBuf>) -> Result<Self> {
        Self::build(paths, true)
    }

    fn build(paths: Vec<PathBuf>, allow_duplicates: bool) -> Result<Self> {
        if paths.is_empty() {
            return Err(SliceKitError::InvalidParameter(
                "Nothing to merge".to_string(),
            ));
        }

        if !allow_duplicates {
            let mut seen = HashSet::new();
            if let Some(dup) = paths.iter().find(|p| !seen.insert(p.as_path())) {
                return Err(SliceKitError::InvalidParameter(format!(
                    "Duplicate merge entry: {}",
                    dup.display()
                )));
            }
        }

        Ok(Self {
            paths,
            allow_duplicates,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.paths.len() {
            return false;
        }
        self.paths.swap(index - 1, index);
        true
    }

    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.paths.len() {
            return false;
        }
        self.paths.swap(index, index + 1);
        true
    }

    /// Removes an entry; the last one cannot be removed.
    pub fn remove(&mut self, index: usize) -> Result<PathBuf> {
        if index >= self.paths.len() {
            return Err(SliceKitError::InvalidParameter(format!(
                "No merge entry at position {}",
                index
            )));
        }
        if self.paths.len() == 1 {
            return Err(SliceKitError::InvalidParameter(
                "Nothing to merge".to_string(),
            ));
        }
        Ok(self.paths.remove(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub width: u32,
    pub algorithm: ResizeAlgorithm,
}

impl ResizeSpec {
    pub fn new(width: u32) -> Self {
        Self {
            width,
            algorithm: ResizeAlgorithm::Lanczos3,
        }
    }

    pub fn with_algorithm(mut self, algorithm: ResizeAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn validate(&self, max_dimension: u32) -> Result<()> {
        if self.width == 0 {
            return Err(SliceKitError::InvalidParameter(
                "Target width must be greater than 0".to_string(),
            ));
        }
        if self.width > max_dimension {
            return Err(SliceKitError::InvalidParameter(format!(
                "Target width {} exceeds the maximum of {} pixels",
                self.width, max_dimension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_plan_cuts_every_n_rows() {
        let plan = CutPlan::Interval(100);
        assert_eq!(plan.resolve(350).unwrap(), vec![100, 200, 300]);
        assert_eq!(plan.resolve(300).unwrap(), vec![100, 200]);
        assert!(plan.resolve(100).is_err());
    }

    #[test]
    fn count_plan_spaces_cuts_evenly() {
        let plan = CutPlan::Count(3);
        assert_eq!(plan.resolve(1000).unwrap(), vec![250, 500, 750]);
        assert_eq!(plan.segments(1000).unwrap().len(), 4);
        assert!(CutPlan::Count(10).resolve(5).is_err());
    }

    #[test]
    fn huge_cut_count_is_an_error_not_a_panic() {
        assert!(matches!(
            CutPlan::Count(u32::MAX).resolve(1000),
            Err(SliceKitError::InvalidCutPlan(_))
        ));
        assert!(CutPlan::Count(u32::MAX - 1).resolve(1000).is_err());
    }

    #[test]
    fn offsets_must_increase_and_stay_inside() {
        assert!(CutPlan::Offsets(vec![300, 200]).validate().is_err());
        assert!(CutPlan::Offsets(vec![200, 200]).validate().is_err());
        assert!(CutPlan::Offsets(vec![]).validate().is_err());

        let plan = CutPlan::Offsets(vec![100, 500]);
        assert!(plan.resolve(400).is_err());
        assert!(CutPlan::Offsets(vec![0, 10]).resolve(400).is_err());
    }

    #[test]
    fn segments_cover_the_whole_height() {
        let segments = CutPlan::Offsets(vec![10, 25]).segments(40).unwrap();
        assert_eq!(segments, vec![0..10, 10..25, 25..40]);
    }

    #[test]
    fn parse_offsets_ignores_spaces() {
        assert_eq!(
            CutPlan::parse_offsets(" 1200, 2400 ,3600,").unwrap(),
            CutPlan::Offsets(vec![1200, 2400, 3600])
        );
        assert!(CutPlan::parse_offsets("").is_err());
        assert!(CutPlan::parse_offsets("12,abc").is_err());
        assert!(CutPlan::parse_offsets("300,100").is_err());
    }

    #[test]
    fn slice_names_follow_version_and_digits() {
        let source = Path::new("/in/episode 01.png");
        let naming = SliceNaming::default();
        assert_eq!(naming.file_name(source, 0, OutputFormat::Jpeg), "episode 01_000.jpg");

        let naming = SliceNaming {
            base_name: Some(" my:strip? ".to_string()),
            digits: 2,
            version: 4,
        };
        assert_eq!(naming.file_name(source, 7, OutputFormat::Png), "my_strip_v004_07.png");
    }

    #[test]
    fn merge_order_rejects_empty_and_duplicates() {
        assert!(MergeOrder::new(vec![]).is_err());

        let paths = vec![PathBuf::from("a.png"), PathBuf::from("a.png")];
        assert!(MergeOrder::new(paths.clone()).is_err());
        assert_eq!(MergeOrder::with_duplicates(paths).unwrap().len(), 2);
    }

    #[test]
    fn merge_order_can_be_rearranged() {
        let mut order = MergeOrder::new(vec![
            PathBuf::from("a.png"),
            PathBuf::from("b.png"),
            PathBuf::from("c.png"),
        ])
        .unwrap();

        assert!(order.move_down(0));
        assert!(!order.move_up(0));
        assert_eq!(order.remove(2).unwrap(), PathBuf::from("c.png"));
        assert_eq!(order.paths(), &[PathBuf::from("b.png"), PathBuf::from("a.png")]);
    }

    #[test]
    fn resize_spec_rejects_zero_width() {
        assert!(ResizeSpec::new(0).validate(100_000).is_err());
        assert!(ResizeSpec::new(200_000).validate(100_000).is_err());
        assert!(ResizeSpec::new(800).validate(100_000).is_ok());
    }
}
