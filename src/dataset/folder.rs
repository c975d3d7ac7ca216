use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::ServiceError;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// A `root/<class>/<image>` directory tree. Class indices follow the sorted
/// sub-directory names.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub samples: Vec<(PathBuf, i64)>,
}

impl ImageFolder {
    pub fn open(root: &Path) -> Result<Self, ServiceError> {
        let classes = list_classes(root)?;
        if classes.is_empty() {
            return Err(ServiceError::Dataset(format!(
                "no class directories under {}",
                root.display()
            )));
        }

        let mut samples = Vec::new();
        for (idx, class) in classes.iter().enumerate() {
            let mut paths: Vec<PathBuf> = fs::read_dir(root.join(class))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            paths.sort();
            samples.extend(paths.into_iter().map(|p| (p, idx as i64)));
        }

        if samples.is_empty() {
            return Err(ServiceError::Dataset(format!(
                "no images found under {}",
                root.display()
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
            classes,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for (_, label) in &self.samples {
            counts[*label as usize] += 1;
        }
        counts
    }
}

pub fn list_classes(root: &Path) -> Result<Vec<String>, ServiceError> {
    let entries = fs::read_dir(root)
        .map_err(|e| ServiceError::Dataset(format!("cannot read {}: {e}", root.display())))?;

    let mut classes = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|raw| {
            ServiceError::Dataset(format!(
                "class directory name is not valid UTF-8: {}",
                raw.to_string_lossy()
            ))
        })?;
        classes.push(name);
    }
    classes.sort();
    Ok(classes)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_assigns_sorted_class_indices() {
        let dir = tempfile::tempdir().unwrap();
        for (class, files) in [("good", vec!["b.jpg", "a.PNG"]), ("bad", vec!["x.jpeg"])] {
            fs::create_dir_all(dir.path().join(class)).unwrap();
            for f in files {
                fs::write(dir.path().join(class).join(f), b"stub").unwrap();
            }
        }
        fs::write(dir.path().join("good").join("notes.txt"), b"skip").unwrap();
        fs::write(dir.path().join("README.md"), b"skip").unwrap();

        let folder = ImageFolder::open(dir.path()).unwrap();
        assert_eq!(folder.classes, vec!["bad", "good"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_counts(), vec![1, 2]);
        assert_eq!(folder.samples[0].1, 0);
        assert!(folder.samples[1].0.ends_with("good/a.PNG"));
        assert!(folder.samples[2].0.ends_with("good/b.jpg"));
    }

    #[test]
    fn test_open_without_images_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        assert!(ImageFolder::open(dir.path()).is_err());
        assert!(ImageFolder::open(&dir.path().join("missing")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_class_directory_is_an_error() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(OsStr::from_bytes(b"fr\xfcchte"))).unwrap();
        let err = list_classes(dir.path()).unwrap_err();
        assert!(matches!(err, ServiceError::Dataset(_)), "{err:?}");
    }
}
