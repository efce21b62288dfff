use axum::extract::Multipart;

/// An uploaded PDF with its data and original file name.
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Parse a multipart form upload into the list of submitted PDFs, in form
/// order. Every `pdf` field must hold a PDF.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<Vec<UploadedFile>, String> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read form field: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "pdf" => {
                let picked = field.file_name().filter(|n| !n.is_empty());
                let filename = picked
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("upload-{}.pdf", files.len() + 1));
                let picked = picked.is_some();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Failed to read file data: {}", e))?
                    .to_vec();

                // Browsers send an empty part when no file was picked.
                if data.is_empty() && !picked {
                    continue;
                }
                check_pdf(&filename, &data)?;
                files.push(UploadedFile { filename, data });
            }
            _ => {
                // Ignore unknown fields
                let _ = field.bytes().await;
            }
        }
    }

    if files.is_empty() {
        return Err("No PDF uploaded".to_string());
    }
    Ok(files)
}

/// Reject anything that does not start with the PDF magic bytes.
fn check_pdf(filename: &str, data: &[u8]) -> Result<(), String> {
    if data.starts_with(b"%PDF-") {
        Ok(())
    } else {
        Err(format!(
            "{} doesn't appear to be a valid PDF. Please upload PDF files only.",
            filename
        ))
    }
}
