// ============================================================
// Layer 4 — Manifest Image Loader
// ============================================================
// Raw loader for large image sets listed in a CSV manifest:
//
//   # comment
//   n01440764/img_0001.jpeg,0
//   n01443537/img_0002.jpeg,1
//
// Paths are relative to `manifest_root`. A pass walks the
// entries (shuffled when configured), decodes one macrobatch of
// images at a time in parallel, and hands out minibatches of raw
// u8 pixels, channel-major, BGR for colour images.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use image::imageops::FilterType;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::data::batch::{HostBatch, HostInputs, HostIterator, HostTargets};
use crate::error::{Error, Result};

fn default_side() -> usize { 224 }
fn default_channels() -> usize { 3 }
fn default_fraction() -> f64 { 1.0 }

/// Loader settings read from a `train_config` / `test_config` block
/// after the batch-size fields have been injected. Unknown keys are
/// rejected so a misspelt setting cannot silently fall back to its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    pub manifest_filename: PathBuf,
    pub manifest_root:     PathBuf,
    pub minibatch_size:    usize,
    pub macrobatch_size:   usize,
    #[serde(default = "default_side")]
    pub height:            usize,
    #[serde(default = "default_side")]
    pub width:             usize,
    #[serde(default = "default_channels")]
    pub channels:          usize,
    pub shuffle:           Option<bool>,
    #[serde(default = "default_fraction")]
    pub subset_fraction:   f64,
}

impl ManifestConfig {
    pub fn from_mapping(block: &Mapping) -> Result<Self> {
        let cfg: Self = serde_yaml::from_value(Value::Mapping(block.clone()))
            .map_err(|e| Error::config(format!("manifest loader config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.minibatch_size == 0 {
            return Err(Error::config("minibatch_size must be > 0"));
        }
        if self.macrobatch_size < self.minibatch_size || self.macrobatch_size % self.minibatch_size != 0 {
            return Err(Error::config(format!(
                "macrobatch_size ({}) must be a multiple of minibatch_size ({})",
                self.macrobatch_size, self.minibatch_size
            )));
        }
        if self.height == 0 || self.width == 0 {
            return Err(Error::config("image height and width must be > 0"));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(Error::config(format!("channels must be 1 or 3, got {}", self.channels)));
        }
        if !(self.subset_fraction > 0.0 && self.subset_fraction <= 1.0) {
            return Err(Error::config(format!(
                "subset_fraction must be in (0, 1], got {}",
                self.subset_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    path:  PathBuf,
    label: usize,
}

#[derive(Debug)]
pub struct ManifestLoader {
    config:  ManifestConfig,
    entries: Vec<Entry>,
    shuffle: bool,
    seed:    Option<u64>,
    passes:  AtomicU64,
}

impl ManifestLoader {
    /// Read the manifest. `shuffle_default` applies when the config
    /// does not say.
    pub fn new(config: ManifestConfig, shuffle_default: bool, seed: Option<u64>) -> Result<Self> {
        let mut entries = read_manifest(&config.manifest_filename, &config.manifest_root)?;

        if config.subset_fraction < 1.0 {
            let keep = ((entries.len() as f64 * config.subset_fraction).ceil() as usize).max(1);
            entries.truncate(keep);
        }

        tracing::info!(
            "Manifest '{}': {} images",
            config.manifest_filename.display(),
            entries.len()
        );
        Ok(Self {
            shuffle: config.shuffle.unwrap_or(shuffle_default),
            config,
            entries,
            seed,
            passes: AtomicU64::new(0),
        })
    }

    fn pass_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        if self.shuffle {
            let pass = self.passes.fetch_add(1, Ordering::Relaxed);
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(pass)),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }
        order
    }

    /// Decode one macrobatch in parallel and cut it into minibatches.
    fn decode_macrobatch(&self, indices: &[usize]) -> Result<Vec<HostBatch>> {
        let images: Vec<Vec<u8>> = indices
            .par_iter()
            .map(|&i| self.decode(&self.entries[i].path))
            .collect::<Result<_>>()?;

        let shape = self.input_shape();
        Ok(indices
            .chunks(self.config.minibatch_size)
            .zip(images.chunks(self.config.minibatch_size))
            .map(|(idx, imgs)| HostBatch {
                size: idx.len(),
                shape,
                inputs: HostInputs::U8(imgs.concat()),
                targets: HostTargets::Labels(idx.iter().map(|&i| self.entries[i].label).collect()),
            })
            .collect())
    }

    fn decode(&self, path: &Path) -> Result<Vec<u8>> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => Error::io(path, io),
            other => Error::invalid_file(path, other.to_string()),
        })?;
        let (w, h) = (self.config.width as u32, self.config.height as u32);
        let img = img.resize_exact(w, h, FilterType::Triangle);

        let plane = self.config.width * self.config.height;
        if self.config.channels == 1 {
            return Ok(img.to_luma8().into_raw());
        }

        let rgb = img.to_rgb8();
        let mut chw = vec![0u8; 3 * plane];
        for (i, px) in rgb.pixels().enumerate() {
            // BGR, channel-major
            chw[i] = px[2];
            chw[plane + i] = px[1];
            chw[2 * plane + i] = px[0];
        }
        Ok(chw)
    }
}

impl HostIterator for ManifestLoader {
    fn ndata(&self) -> usize {
        self.entries.len()
    }

    fn batch_size(&self) -> usize {
        self.config.minibatch_size
    }

    fn input_shape(&self) -> [usize; 3] {
        [self.config.channels, self.config.height, self.config.width]
    }

    fn nclasses(&self) -> usize {
        self.entries.iter().map(|e| e.label + 1).max().unwrap_or(0)
    }

    fn host_batches(&self) -> Box<dyn Iterator<Item = Result<HostBatch>> + '_> {
        let order = self.pass_order();
        let macrobatches: Vec<Vec<usize>> = order
            .chunks(self.config.macrobatch_size)
            .map(<[usize]>::to_vec)
            .collect();

        Box::new(macrobatches.into_iter().flat_map(move |indices| {
            match self.decode_macrobatch(&indices) {
                Ok(batches) => batches.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }
        }))
    }
}

/// Read `path,label` records, skipping blank and `#` lines.
fn read_manifest(path: &Path, root: &Path) -> Result<Vec<Entry>> {
    let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut entries = Vec::new();
    for record in reader.deserialize::<(PathBuf, usize)>() {
        let (rel, label) = record.map_err(|e| Error::invalid_file(path, format!("manifest record: {e}")))?;
        entries.push(Entry { path: root.join(rel), label });
    }

    if entries.is_empty() {
        return Err(Error::invalid_file(path, "manifest lists no images"));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    /// Writes `n` solid-colour 8x6 PNGs and a manifest naming them.
    fn fixture(label: &str, n: usize) -> (PathBuf, PathBuf) {
        let dir = scratch_dir(label);
        fs::create_dir_all(dir.join("imgs")).unwrap();
        let mut manifest = String::from("# path,label\n\n");
        for i in 0..n {
            let img = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, i as u8]));
            img.save(dir.join(format!("imgs/{i}.png"))).unwrap();
            manifest.push_str(&format!("imgs/{i}.png,{}\n", i % 4));
        }
        let path = dir.join("train-index.csv");
        fs::write(&path, manifest).unwrap();
        (dir, path)
    }

    fn config(dir: &Path, manifest: &Path, mini: usize, macro_: usize) -> ManifestConfig {
        ManifestConfig {
            manifest_filename: manifest.to_path_buf(),
            manifest_root:     dir.to_path_buf(),
            minibatch_size:    mini,
            macrobatch_size:   macro_,
            height:            4,
            width:             4,
            channels:          3,
            shuffle:           None,
            subset_fraction:   1.0,
        }
    }

    #[test]
    fn emits_minibatches_in_bgr_channel_major_order() {
        let (dir, manifest) = fixture("manifest-order", 5);
        let loader = ManifestLoader::new(config(&dir, &manifest, 2, 4), false, None).unwrap();
        assert_eq!(loader.ndata(), 5);
        assert_eq!(loader.nclasses(), 4);

        let batches: Vec<HostBatch> = loader.host_batches().map(Result::unwrap).collect();
        let sizes: Vec<usize> = batches.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let first = &batches[0];
        assert_eq!(first.shape, [3, 4, 4]);
        assert_eq!(first.targets, HostTargets::Labels(vec![0, 1]));
        match &first.inputs {
            HostInputs::U8(px) => {
                assert_eq!(px.len(), 2 * 48);
                assert_eq!(px[0], 0); // blue of image 0
                assert_eq!(px[16], 20); // green
                assert_eq!(px[32], 10); // red
                assert_eq!(px[48], 1); // blue of image 1
            }
            other => panic!("expected u8 inputs, got {other:?}"),
        }
    }

    #[test]
    fn seeded_shuffle_is_reproducible_and_complete() {
        let (dir, manifest) = fixture("manifest-shuffle", 6);
        let labels = |seed| {
            let loader = ManifestLoader::new(config(&dir, &manifest, 3, 3), true, Some(seed)).unwrap();
            loader
                .host_batches()
                .flat_map(|b| match b.unwrap().targets {
                    HostTargets::Labels(l) => l,
                    _ => unreachable!(),
                })
                .collect::<Vec<_>>()
        };
        let a = labels(11);
        assert_eq!(a, labels(11));
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 0, 1, 1, 2, 3]);
    }

    #[test]
    fn subset_fraction_keeps_a_prefix() {
        let (dir, manifest) = fixture("manifest-subset", 6);
        let mut cfg = config(&dir, &manifest, 2, 2);
        cfg.subset_fraction = 0.5;
        assert_eq!(ManifestLoader::new(cfg, false, None).unwrap().ndata(), 3);
    }

    #[test]
    fn missing_manifest_is_io_error() {
        let dir = scratch_dir("manifest-missing");
        let cfg = config(&dir, &dir.join("nope.csv"), 2, 2);
        assert!(matches!(ManifestLoader::new(cfg, true, None), Err(Error::Io { .. })));
    }

    #[test]
    fn malformed_line_is_invalid_data() {
        let dir = scratch_dir("manifest-malformed");
        fs::write(dir.join("m.csv"), "a.png,zero\n").unwrap();
        match read_manifest(&dir.join("m.csv"), &dir) {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected invalid data, got {other:?}"),
        }
    }

    #[test]
    fn quoted_path_with_comma_is_one_field() {
        let dir = scratch_dir("manifest-quoted");
        fs::write(dir.join("m.csv"), "# path,label\n\"a,b.png\", 2\n c.png ,0\n").unwrap();
        let entries = read_manifest(&dir.join("m.csv"), &dir).unwrap();
        assert_eq!(
            entries,
            vec![
                Entry { path: dir.join("a,b.png"), label: 2 },
                Entry { path: dir.join("c.png"), label: 0 },
            ]
        );
    }

    #[test]
    fn missing_label_column_is_invalid_data() {
        let dir = scratch_dir("manifest-one-column");
        fs::write(dir.join("m.csv"), "a.png\n").unwrap();
        match read_manifest(&dir.join("m.csv"), &dir) {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected invalid data, got {other:?}"),
        }
    }

    #[test]
    fn config_rejects_misspelt_key() {
        let mut block = Mapping::new();
        block.insert("manifest_filename".into(), "m.csv".into());
        block.insert("manifest_root".into(), ".".into());
        block.insert("minibatch_size".into(), 4.into());
        block.insert("macrobatch_size".into(), 8.into());
        block.insert("hieght".into(), 32.into());
        match ManifestConfig::from_mapping(&block) {
            Err(Error::Config { message }) => assert!(message.contains("hieght"), "{message}"),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn config_rejects_uneven_macrobatch() {
        let mut block = Mapping::new();
        block.insert("manifest_filename".into(), "m.csv".into());
        block.insert("manifest_root".into(), ".".into());
        block.insert("minibatch_size".into(), 4.into());
        block.insert("macrobatch_size".into(), 6.into());
        assert!(matches!(ManifestConfig::from_mapping(&block), Err(Error::Config { .. })));

        block.insert("macrobatch_size".into(), 8.into());
        let cfg = ManifestConfig::from_mapping(&block).unwrap();
        assert_eq!((cfg.height, cfg.width, cfg.channels), (224, 224, 3));
    }
}
