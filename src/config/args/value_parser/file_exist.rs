use std::path::PathBuf;

pub fn is_file_exist(file_path: &str) -> Result<PathBuf, String> {
    let file_path = PathBuf::from(file_path);

    if file_path.is_file() {
        Ok(file_path)
    } else {
        Err(format!("file does not exist: {}", file_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert_eq!(is_file_exist(&path).unwrap(), file.path());
    }

    #[test]
    fn missing_file_or_directory() {
        assert!(is_file_exist("./no/such/file.yaml").is_err());
        assert!(is_file_exist(&std::env::temp_dir().to_string_lossy()).is_err());
    }
}
