//! Color source
//!
//! Clusters the dominant colors of the photo, maps every cluster centre to
//! emotion words through the [`ColorTable`], and reports the most frequent
//! word.
//!
//! # Algorithm
//! 1. Decode and resize to 150x100
//! 2. Sample up to 2000 pixels (seeded, reproducible)
//! 3. k-means, k = 5, at most 10 iterations
//! 4. Clusters ordered by population, largest first
//! 5. Nearest table row per centre (bounded cache keyed by RGB)
//! 6. Most frequent word wins, ties go to the first seen

use super::color_table::{ColorTable, ColorTableError};
use crate::types::{AnalysisResult, AnalyzerError, AnalyzerSource, EmotionAnalyzer};
use image::imageops::FilterType;
use moka::sync::Cache;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const RESIZE_WIDTH: u32 = 150;
const RESIZE_HEIGHT: u32 = 100;
const SAMPLE_SIZE: usize = 2000;
const NUM_COLORS: usize = 5;
const MAX_ITERATIONS: usize = 10;
const RANDOM_SEED: u64 = 42;

/// Capacity of the RGB → words cache
pub const DISTANCE_CACHE_CAPACITY: u64 = 64;

/// One dominant color cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCluster {
    pub count: usize,
    pub center: [f32; 3],
}

impl ColorCluster {
    pub fn rgb(&self) -> [u8; 3] {
        self.center.map(|c| c as u8)
    }

    pub fn hex(&self) -> String {
        let [r, g, b] = self.rgb();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

pub struct ColorAnalyzer {
    table_paths: Vec<PathBuf>,
    table: OnceCell<Arc<ColorTable>>,
    distance_cache: Cache<[u8; 3], Arc<Vec<String>>>,
}

impl ColorAnalyzer {
    pub fn new(table_paths: Vec<PathBuf>) -> Self {
        Self {
            table_paths,
            table: OnceCell::new(),
            distance_cache: Cache::new(DISTANCE_CACHE_CAPACITY),
        }
    }

    /// Analyzer over an already-loaded table
    pub fn with_table(table: ColorTable) -> Self {
        Self {
            table_paths: Vec::new(),
            table: OnceCell::new_with(Some(Arc::new(table))),
            distance_cache: Cache::new(DISTANCE_CACHE_CAPACITY),
        }
    }

    /// Load the table on first use; a failed load is retried next request
    pub async fn ensure_ready(&self) -> Result<Arc<ColorTable>, ColorTableError> {
        self.table
            .get_or_try_init(|| async { ColorTable::load_first(&self.table_paths).await.map(Arc::new) })
            .await
            .cloned()
    }

    fn emotions_for(&self, table: &ColorTable, rgb: [u8; 3]) -> Arc<Vec<String>> {
        self.distance_cache
            .get_with(rgb, || Arc::new(table.nearest_emotions(rgb)))
    }
}

#[async_trait::async_trait]
impl EmotionAnalyzer for ColorAnalyzer {
    fn source(&self) -> AnalyzerSource {
        AnalyzerSource::Color
    }

    async fn analyze(&self, image_path: &Path) -> Result<AnalysisResult, AnalyzerError> {
        let table = match self.ensure_ready().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Color table unavailable");
                return Ok(AnalysisResult::failed(AnalyzerSource::Color)
                    .with_metadata("palette", Vec::<String>::new()));
            }
        };

        let path = image_path.to_path_buf();
        let clusters = tokio::task::spawn_blocking(move || extract_colors(&path))
            .await
            .map_err(|e| AnalyzerError::Worker(e.to_string()))?;

        let clusters = match clusters {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(image = %image_path.display(), error = %e, "Cannot open image for color analysis");
                return Ok(AnalysisResult::failed(AnalyzerSource::Color)
                    .with_metadata("palette", Vec::<String>::new()));
            }
        };

        let mut words = Vec::new();
        for cluster in &clusters {
            words.extend(self.emotions_for(&table, cluster.rgb()).iter().cloned());
        }

        let palette: Vec<String> = clusters.iter().map(ColorCluster::hex).collect();
        let emotion = most_common(&words).unwrap_or(crate::types::FAILURE_SENTINEL);
        debug!(emotion = %emotion, palette = ?palette, "Color analysis complete");

        Ok(AnalysisResult::new(AnalyzerSource::Color, emotion).with_metadata("palette", palette))
    }

    fn is_available(&self) -> bool {
        self.table.initialized() || self.table_paths.iter().any(|p| p.exists())
    }
}

/// Decode, sample and cluster the image (blocking)
pub fn extract_colors(path: &Path) -> Result<Vec<ColorCluster>, image::ImageError> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let small = img
        .resize_exact(RESIZE_WIDTH, RESIZE_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let pixels: Vec<[f32; 3]> = small
        .pixels()
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();

    Ok(cluster_colors(&pixels, NUM_COLORS))
}

/// k-means over `pixels`, clusters sorted by population (desc)
pub fn cluster_colors(pixels: &[[f32; 3]], k: usize) -> Vec<ColorCluster> {
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);

    let sample: Vec<[f32; 3]> = if pixels.len() > SAMPLE_SIZE {
        index::sample(&mut rng, pixels.len(), SAMPLE_SIZE)
            .into_iter()
            .map(|i| pixels[i])
            .collect()
    } else {
        pixels.to_vec()
    };

    let k = k.min(sample.len());
    if k == 0 {
        return Vec::new();
    }

    let mut centers: Vec<[f32; 3]> = index::sample(&mut rng, sample.len(), k)
        .into_iter()
        .map(|i| sample[i])
        .collect();
    let mut assignment = vec![usize::MAX; sample.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (slot, pixel) in assignment.iter_mut().zip(&sample) {
            let nearest = nearest_center(&centers, pixel);
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&cluster, pixel) in assignment.iter().zip(&sample) {
            counts[cluster] += 1;
            for c in 0..3 {
                sums[cluster][c] += pixel[c] as f64;
            }
        }
        for (i, center) in centers.iter_mut().enumerate() {
            // Empty clusters keep their previous centre
            if counts[i] > 0 {
                *center = sums[i].map(|s| (s / counts[i] as f64) as f32);
            }
        }
    }

    let mut counts = vec![0usize; k];
    for &cluster in &assignment {
        counts[cluster] += 1;
    }

    let mut clusters: Vec<ColorCluster> = centers
        .into_iter()
        .zip(counts)
        .map(|(center, count)| ColorCluster { count, center })
        .collect();
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
}

fn nearest_center(centers: &[[f32; 3]], pixel: &[f32; 3]) -> usize {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let d: f32 = (0..3).map(|j| (c[j] - pixel[j]).powi(2)).sum();
            (i, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Most frequent word; ties resolved by first occurrence
pub fn most_common(words: &[String]) -> Option<&str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in words.iter().enumerate() {
        counts.entry(word.as_str()).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(word, _)| word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const TABLE: &str = "R,G,B,word1,word2\n\
                         255,0,0,情熱的な,\n\
                         0,0,255,冷静な,穏やかな\n\
                         0,255,0,穏やかな,\n";

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_most_common_tie_goes_to_first() {
        assert_eq!(most_common(&words(&["a", "b", "b", "a"])), Some("a"));
        assert_eq!(most_common(&words(&["a", "b", "b"])), Some("b"));
        assert_eq!(most_common(&[]), None);
    }

    #[test]
    fn test_cluster_colors_two_blocks() {
        let mut pixels = vec![[250.0, 0.0, 0.0]; 300];
        pixels.extend(vec![[0.0, 0.0, 250.0]; 100]);

        let clusters = cluster_colors(&pixels, 2);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].count, 300);
        assert_eq!(clusters[0].rgb(), [250, 0, 0]);
        assert_eq!(clusters[1].hex(), "#0000fa");
    }

    #[test]
    fn test_cluster_colors_is_deterministic() {
        let pixels: Vec<[f32; 3]> = (0..5000)
            .map(|i| [(i % 256) as f32, ((i * 7) % 256) as f32, ((i * 13) % 256) as f32])
            .collect();

        assert_eq!(cluster_colors(&pixels, 5), cluster_colors(&pixels, 5));
    }

    #[test]
    fn test_fewer_pixels_than_clusters() {
        let clusters = cluster_colors(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], 5);
        assert_eq!(clusters.len(), 2);
        assert!(cluster_colors(&[], 5).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_mostly_blue_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blue.png");
        let mut img = RgbImage::from_pixel(60, 40, Rgb([0, 0, 240]));
        for x in 0..10 {
            for y in 0..40 {
                img.put_pixel(x, y, Rgb([0, 240, 0]));
            }
        }
        img.save(&path).unwrap();

        let analyzer = ColorAnalyzer::with_table(ColorTable::parse(TABLE).unwrap());
        let result = analyzer.analyze(&path).await.unwrap();

        // blue → [冷静な, 穏やかな], green → [穏やかな]
        assert_eq!(result.emotion, "穏やかな");
        assert_eq!(result.source, AnalyzerSource::Color);
        assert!(!result.metadata["palette"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_degrades_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ColorAnalyzer::new(vec![dir.path().join("missing.csv")]);
        assert!(!analyzer.is_available());

        let result = analyzer.analyze(&dir.path().join("any.png")).await.unwrap();
        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn test_undecodable_image_degrades_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let analyzer = ColorAnalyzer::with_table(ColorTable::parse(TABLE).unwrap());
        let result = analyzer.analyze(&path).await.unwrap();
        assert!(result.is_failure());
    }
}
