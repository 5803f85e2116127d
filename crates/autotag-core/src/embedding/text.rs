//! CLIP text encoder for generating term embeddings.
//!
//! Loads the text ONNX model and tokenizer, encodes strings into vectors
//! aligned with the vision encoder's space.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// CLIP text encoder wrapper.
///
/// Uses the same `Mutex<Session>` pattern as the vision encoder.
pub struct TextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    max_length: usize,
    output_name: String,
    /// Some exports take `input_ids` only, others also want `attention_mask`.
    uses_attention_mask: bool,
}

impl TextEncoder {
    /// Load the text encoder and its tokenizer.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_length: usize,
        output_name: &str,
    ) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load text encoder {:?}: {e}", model_path),
            })?;

        let tokenizer =
            tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| PipelineError::Model {
                message: format!("Failed to load tokenizer {:?}: {e}", tokenizer_path),
            })?;

        let uses_attention_mask = session
            .inputs()
            .iter()
            .any(|i| i.name() == "attention_mask");

        tracing::debug!(
            "Loaded text encoder (inputs: {:?}, outputs: {:?})",
            session
                .inputs()
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>(),
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length,
            output_name: output_name.to_string(),
            uses_attention_mask,
        })
    }

    /// Encode a batch of text strings to normalized embeddings.
    ///
    /// Returns one vector per input text, in input order.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batch_size = texts.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }
        let max_length = self.max_length;

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;

        // Zero padding keeps the end-of-text token the argmax, which CLIP pools on.
        let mut input_ids = vec![0i64; batch_size * max_length];
        let mut attention_mask = vec![0i64; batch_size * max_length];

        for (i, encoding) in encodings.iter().enumerate() {
            for (j, &id) in encoding.get_ids().iter().take(max_length).enumerate() {
                input_ids[i * max_length + j] = id as i64;
                attention_mask[i * max_length + j] = 1;
            }
        }

        let shape = vec![batch_size as i64, max_length as i64];
        let input_ids_value =
            Value::from_array((shape.clone(), input_ids)).map_err(|e| PipelineError::Model {
                message: format!("Failed to create input_ids tensor: {e}"),
            })?;

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Text encoder lock poisoned: {e}"),
        })?;

        let outputs = if self.uses_attention_mask {
            let mask_value =
                Value::from_array((shape, attention_mask)).map_err(|e| PipelineError::Model {
                    message: format!("Failed to create attention_mask tensor: {e}"),
                })?;
            session.run(ort::inputs![
                "input_ids" => input_ids_value,
                "attention_mask" => mask_value
            ])
        } else {
            session.run(ort::inputs!["input_ids" => input_ids_value])
        }
        .map_err(|e| PipelineError::Model {
            message: format!("Text encoder inference failed: {e}"),
        })?;

        let output = outputs
            .iter()
            .find(|(name, _)| *name == self.output_name)
            .ok_or_else(|| PipelineError::Model {
                message: format!("Text encoder did not produce {}", self.output_name),
            })?;

        let (shape, data) =
            output
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Model {
                    message: format!("Failed to extract {}: {e}", self.output_name),
                })?;

        split_rows(&shape, data, batch_size, &self.output_name)
    }
}

/// Split a `[batch, dim]` output into normalized per-term rows.
fn split_rows(
    shape: &[i64],
    data: &[f32],
    batch_size: usize,
    output_name: &str,
) -> Result<Vec<Vec<f32>>, PipelineError> {
    let embedding_dim = match shape {
        [_, dim] if *dim > 0 => *dim as usize,
        _ => {
            return Err(PipelineError::Model {
                message: format!("Unexpected {} shape: {:?}", output_name, shape),
            });
        }
    };

    let mut rows = data[..data.len().min(batch_size * embedding_dim)].to_vec();
    crate::math::normalize_rows(&mut rows, embedding_dim);
    Ok(rows
        .chunks_exact(embedding_dim)
        .map(<[f32]>::to_vec)
        .collect())
}
