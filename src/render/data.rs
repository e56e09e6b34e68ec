//! Data normaliser: caller data to the escaped [`Value`] tree templates see.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::image::{has_image_extension, is_data_uri, ImageError, ImageHandle};
use super::options::RenderOptions;
use super::ser::to_raw_value;
use crate::error::Result;
use crate::template::Value;

/// Converts `data` into the canonical tree.
///
/// String leaves are XML-escaped. With image detection on, strings that
/// name an existing image file (or are `data:image/…;base64,` URIs) are
/// loaded and become image leaves.
pub fn normalize<T: Serialize + ?Sized>(data: &T, options: &RenderOptions) -> Result<Value> {
    let raw = to_raw_value(data)?;
    let mut images = 0;
    let value = Normalizer {
        options,
        images: &mut images,
    }
    .convert(raw)?;
    debug!(images, "normalised data");
    Ok(value)
}

struct Normalizer<'a> {
    options: &'a RenderOptions,
    images: &'a mut usize,
}

impl Normalizer<'_> {
    fn convert(&mut self, raw: Value) -> Result<Value> {
        Ok(match raw {
            Value::String(s) => self.string(s)?,
            Value::Seq(items) => Value::Seq(
                items
                    .into_iter()
                    .map(|item| self.convert(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| -> Result<(String, Value)> { Ok((k, self.convert(v)?)) })
                    .collect::<Result<_>>()?,
            ),
            other => other,
        })
    }

    fn string(&mut self, s: String) -> Result<Value> {
        if !self.options.detect_images {
            return Ok(Value::text(&s));
        }
        let loaded = if is_data_uri(&s) {
            Some(ImageHandle::from_data_uri(&s, self.options.default_dpi))
        } else {
            self.image_path(&s)
                .map(|path| ImageHandle::from_path(&path, self.options.default_dpi))
        };
        match loaded {
            None => Ok(Value::text(&s)),
            Some(Ok(image)) => {
                *self.images += 1;
                Ok(Value::image(image))
            }
            Some(Err(err)) if self.options.lenient_images => {
                warn!(error = %err, value = %excerpt(&s), "image could not be loaded; keeping text");
                Ok(Value::text(&s))
            }
            Some(Err(err)) => Err(image_error(err, &s)),
        }
    }

    /// Path of an existing file with an image extension
    fn image_path(&self, s: &str) -> Option<PathBuf> {
        if s.contains('\n') || !has_image_extension(s) {
            return None;
        }
        let path = Path::new(s);
        let path = match &self.options.image_base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        path.is_file().then_some(path)
    }
}

fn image_error(err: ImageError, value: &str) -> crate::error::Error {
    crate::error::Error::from(err).with_placeholder(excerpt(value))
}

fn excerpt(s: &str) -> String {
    const MAX: usize = 60;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(MAX).collect::<String>())
    }
}
