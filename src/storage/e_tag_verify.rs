use crate::types::error::StorageError;

/// `Some(matched)` when both ETags are comparable, `None` when one is missing or multipart.
pub fn verify_e_tag(source_e_tag: Option<&str>, target_e_tag: Option<&str>) -> Option<bool> {
    let source_normalized_e_tag = normalize_e_tag(source_e_tag?);
    let target_normalized_e_tag = normalize_e_tag(target_e_tag?);

    if is_multipart_upload_e_tag(&source_normalized_e_tag)
        || is_multipart_upload_e_tag(&target_normalized_e_tag)
    {
        return None;
    }

    Some(source_normalized_e_tag == target_normalized_e_tag)
}

/// Compares a written object against the listed source. Falls back to size only
/// when the ETags cannot be compared.
pub fn verify_transfer(
    key: &str,
    source_size: u64,
    source_e_tag: Option<&str>,
    target_size: u64,
    target_e_tag: Option<&str>,
) -> Result<(), StorageError> {
    if source_size != target_size {
        return Err(StorageError::ValidationMismatch(format!(
            "size of {key} differs: source {source_size}, target {target_size}"
        )));
    }

    if verify_e_tag(source_e_tag, target_e_tag) == Some(false) {
        return Err(StorageError::ValidationMismatch(format!(
            "etag of {key} differs: source {}, target {}",
            source_e_tag.unwrap_or_default(),
            target_e_tag.unwrap_or_default()
        )));
    }

    Ok(())
}

pub fn is_multipart_upload_e_tag(e_tag: &str) -> bool {
    e_tag.contains('-')
}

pub fn generate_e_tag_hash(concatenated_md5_hash: &[u8], parts_count: usize) -> String {
    if parts_count == 0 {
        format!("{:?}", hex::encode(concatenated_md5_hash))
    } else {
        format!(
            "\"{:?}-{}\"",
            md5::compute(concatenated_md5_hash),
            parts_count
        )
    }
}

pub fn normalize_e_tag(e_tag: &str) -> String {
    e_tag.replace('\"', "")
}
