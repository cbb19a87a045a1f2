//! Copie de fichiers et de répertoires d'artefacts

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Résultat d'une copie planifiée
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// La source a été copiée vers ce chemin
    Copied(PathBuf),
    /// La source n'existe pas, rien n'a été copié
    Missing(PathBuf),
}

/// Copie un fichier ou une arborescence vers le chemin exact `target`
///
/// Les répertoires parents de `target` sont créés au besoin. Une source
/// absente n'est pas une erreur: elle donne `CopyOutcome::Missing`.
pub fn copy_to(src: &Path, target: &Path) -> io::Result<CopyOutcome> {
    if !src.exists() {
        return Ok(CopyOutcome::Missing(src.to_path_buf()));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if src.is_dir() {
        copy_dir(src, target)?;
    } else {
        fs::copy(src, target)?;
    }

    Ok(CopyOutcome::Copied(target.to_path_buf()))
}

fn copy_dir(src: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("RunInfo.xml");
        fs::write(&src, "<RunInfo/>").unwrap();

        let target = dir.path().join("out/nested/RunInfo.xml");
        let outcome = copy_to(&src, &target).unwrap();

        assert_eq!(outcome, CopyOutcome::Copied(target.clone()));
        assert_eq!(fs::read_to_string(target).unwrap(), "<RunInfo/>");
    }

    #[test]
    fn test_copy_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("InterOp");
        fs::create_dir_all(src.join("C1.1")).unwrap();
        fs::write(src.join("TileMetricsOut.bin"), [1u8, 2, 3]).unwrap();
        fs::write(src.join("C1.1/ErrorMetrics.bin"), [4u8]).unwrap();

        let dest = dir.path().join("copy");
        copy_to(&src, &dest.join("InterOp")).unwrap();

        assert_eq!(fs::read(dest.join("InterOp/TileMetricsOut.bin")).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs::read(dest.join("InterOp/C1.1/ErrorMetrics.bin")).unwrap(), vec![4]);
    }

    #[test]
    fn test_copy_to_keeps_distinct_targets() {
        let dir = tempfile::tempdir().unwrap();
        let intensities = dir.path().join("Data/Intensities");
        fs::create_dir_all(intensities.join("BaseCalls")).unwrap();
        fs::write(intensities.join("config.xml"), "INTENSITIES").unwrap();
        fs::write(intensities.join("BaseCalls/config.xml"), "BASECALLS").unwrap();

        let dest = dir.path().join("out");
        copy_to(&intensities.join("config.xml"), &dest.join("Data/Intensities/config.xml")).unwrap();
        copy_to(
            &intensities.join("BaseCalls/config.xml"),
            &dest.join("Data/Intensities/BaseCalls/config.xml"),
        )
        .unwrap();

        assert_eq!(fs::read_to_string(dest.join("Data/Intensities/config.xml")).unwrap(), "INTENSITIES");
        assert_eq!(
            fs::read_to_string(dest.join("Data/Intensities/BaseCalls/config.xml")).unwrap(),
            "BASECALLS"
        );
    }

    #[test]
    fn test_missing_source_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("RTAComplete.txt");

        let outcome = copy_to(&src, &dir.path().join("out/RTAComplete.txt")).unwrap();
        assert_eq!(outcome, CopyOutcome::Missing(src));
    }
}
