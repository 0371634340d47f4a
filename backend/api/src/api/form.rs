//! Multipart form decoding.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::blob::IncomingFile;
use crate::errors::{Result, ServiceError};

/// A fully buffered multipart body: text fields by name, files in order.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: Vec<(String, IncomingFile)>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Form::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::invalid(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ServiceError::invalid(format!("upload failed: {e}")))?;
                    form.files.push((
                        name,
                        IncomingFile {
                            filename,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    ));
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ServiceError::invalid(format!("bad field {name}: {e}")))?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// Remove and return the files uploaded under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<IncomingFile> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| field == name);
        self.files = rest;
        matching.into_iter().map(|(_, file)| file).collect()
    }

    /// Non-blank text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.text(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ServiceError::invalid(format!("{name} is not valid")))
            })
            .transpose()
    }

    pub fn required<T: FromStr>(&self, name: &str) -> Result<T> {
        self.parsed(name)?
            .ok_or_else(|| ServiceError::invalid(format!("{name} is required")))
    }

    pub fn uuid(&self, name: &str) -> Result<Option<Uuid>> {
        self.parsed(name)
    }

    pub fn decimal(&self, name: &str) -> Result<Decimal> {
        self.required(name)
    }
}
