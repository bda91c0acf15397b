// ============================================================
// Layer 6 — Checkpoint Files
// ============================================================
// Saves and restores network parameters as named MessagePack
// records, plus a JSON sidecar describing what the parameters
// belong to.
//
// A checkpoint path names a stem; two files live next to it,
// named by appending to the full stem (`out/model.v2` gives
// `out/model.v2.mpk`):
//
//   <stem>.mpk    parameters (full precision)
//   <stem>.json   {epoch, input_features, layers}
//
// The sidecar is read first so the network can be rebuilt with
// the right shapes before the record is loaded into it. Any
// mismatch or unreadable file is reported as an I/O error on
// the offending path.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::domain::model_spec::LayerSpec;
use crate::error::{Error, Result};
use crate::ml::model::Network;

const RECORD_EXT: &str = "mpk";
const META_EXT:   &str = "json";

/// Sidecar written next to every parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Completed epochs when the checkpoint was taken
    pub epoch:          usize,
    pub input_features: usize,
    pub layers:         Vec<LayerSpec>,
}

type ParamRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    stem: PathBuf,
}

impl Checkpoint {
    /// Accepts either the bare stem or a path ending in one of the
    /// two checkpoint extensions.
    pub fn new(path: &Path) -> Self {
        let text = path.to_string_lossy();
        let stem = [RECORD_EXT, META_EXT]
            .iter()
            .find_map(|ext| text.strip_suffix(&format!(".{ext}")))
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf());
        Self { stem }
    }

    pub fn stem(&self) -> &Path {
        &self.stem
    }

    pub fn record_path(&self) -> PathBuf {
        self.with_suffix(RECORD_EXT)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.with_suffix(META_EXT)
    }

    /// `<stem>.<ext>`; an existing dot in the stem is kept.
    fn with_suffix(&self, ext: &str) -> PathBuf {
        let mut name = self.stem.clone().into_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.record_path().is_file() && self.meta_path().is_file()
    }

    pub fn save<B: Backend>(&self, network: &Network<B>, meta: &CheckpointMeta) -> Result<()> {
        if let Some(parent) = self.stem.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let record_path = self.record_path();
        let bytes = ParamRecorder::new()
            .record(network.clone().into_record(), ())
            .map_err(|e| Error::invalid_file(&record_path, e.to_string()))?;
        fs::write(&record_path, bytes).map_err(|e| Error::io(&record_path, e))?;

        let meta_path = self.meta_path();
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| Error::invalid_file(&meta_path, e.to_string()))?;
        fs::write(&meta_path, json).map_err(|e| Error::io(&meta_path, e))?;

        tracing::debug!("Saved checkpoint '{}' (epoch {})", self.stem.display(), meta.epoch);
        Ok(())
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        let path = self.meta_path();
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::invalid_file(&path, e.to_string()))
    }

    /// Load the parameter file into `network`, which must already have
    /// the shapes recorded in the sidecar.
    pub fn load_network<B: Backend>(&self, network: Network<B>, device: &B::Device) -> Result<Network<B>> {
        let path = self.record_path();
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let record = ParamRecorder::new()
            .load(bytes, device)
            .map_err(|e| Error::invalid_file(&path, e.to_string()))?;
        Ok(network.load_record(record))
    }

    /// Remove both files, ignoring ones that are already gone.
    pub fn remove(&self) -> Result<()> {
        for path in [self.record_path(), self.meta_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scratch_dir, TestBackend};

    #[test]
    fn stem_is_normalized_from_either_file_name() {
        let a = Checkpoint::new(Path::new("out/run"));
        let b = Checkpoint::new(Path::new("out/run.mpk"));
        let c = Checkpoint::new(Path::new("out/run.json"));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.record_path(), PathBuf::from("out/run.mpk"));
        assert_eq!(a.meta_path(), PathBuf::from("out/run.json"));
    }

    #[test]
    fn dotted_stem_keeps_its_suffix() {
        let ckpt = Checkpoint::new(Path::new("out/model.ckpt"));
        assert_eq!(ckpt.record_path(), PathBuf::from("out/model.ckpt.mpk"));
        assert_eq!(ckpt.meta_path(), PathBuf::from("out/model.ckpt.json"));
        let tagged = Checkpoint::new(Path::new("out/model.ckpt_e3"));
        assert_ne!(tagged.record_path(), ckpt.record_path());
    }

    #[test]
    fn save_writes_the_named_files_and_loads_them_back() {
        let dir = scratch_dir("checkpoint-files");
        let device = Default::default();
        let layers = vec![LayerSpec::Linear {
            nout:       2,
            activation: crate::domain::model_spec::Activation::Softmax,
            bias:       true,
        }];
        let network = Network::<TestBackend>::init(&layers, 3, &device);
        let meta = CheckpointMeta { epoch: 4, input_features: 3, layers: layers.clone() };

        let ckpt = Checkpoint::new(&dir.join("model.v2"));
        ckpt.save(&network, &meta).unwrap();

        let mut names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["model.v2.json", "model.v2.mpk"]);
        assert!(ckpt.exists());
        assert_eq!(ckpt.load_meta().unwrap(), meta);

        let blank = Network::<TestBackend>::init(&layers, 3, &device);
        let loaded = ckpt.load_network(blank, &device).unwrap();
        let expected = network.layers[0].linear.as_ref().unwrap().weight.val().into_data().to_vec::<f32>().unwrap();
        let actual = loaded.layers[0].linear.as_ref().unwrap().weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual, expected);

        ckpt.remove().unwrap();
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = scratch_dir("checkpoint-absent");
        let device = Default::default();
        let blank = Network::<TestBackend>::init(&[], 2, &device);
        match Checkpoint::new(&dir.join("gone")).load_network(blank, &device) {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn garbage_sidecar_is_invalid_data() {
        let dir = scratch_dir("checkpoint-garbage");
        fs::write(dir.join("bad.json"), "not json").unwrap();
        match Checkpoint::new(&dir.join("bad")).load_meta() {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn remove_tolerates_missing_files() {
        let dir = scratch_dir("checkpoint-remove");
        Checkpoint::new(&dir.join("never-written")).remove().unwrap();
    }
}
