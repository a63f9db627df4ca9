//! v2 inference protocol types.
//!
//! Requests and responses carry typed tensors: a name, a shape, a datatype
//! and the row-major flattened data. Helpers here convert between tensors
//! and the nested JSON values models work with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upper bound on the outer arrays an empty tensor may expand into, e.g.
/// shape `[n, 0]` builds `n` empty rows.
pub const MAX_EMPTY_ROWS: usize = 65_536;

/// Tensor element types defined by the v2 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Fp16,
    Fp32,
    Fp64,
    Bytes,
}

impl DataType {
    /// Whether a JSON element is a valid value of this datatype.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            DataType::Bool => value.is_boolean(),
            DataType::Uint8 => fits_unsigned(value, u8::MAX as u64),
            DataType::Uint16 => fits_unsigned(value, u16::MAX as u64),
            DataType::Uint32 => fits_unsigned(value, u32::MAX as u64),
            DataType::Uint64 => value.is_u64(),
            DataType::Int8 => fits_signed(value, i8::MIN as i64, i8::MAX as i64),
            DataType::Int16 => fits_signed(value, i16::MIN as i64, i16::MAX as i64),
            DataType::Int32 => fits_signed(value, i32::MIN as i64, i32::MAX as i64),
            DataType::Int64 => value.is_i64(),
            DataType::Fp16 | DataType::Fp32 | DataType::Fp64 => value.is_number(),
            DataType::Bytes => value.is_string(),
        }
    }
}

fn fits_unsigned(value: &Value, max: u64) -> bool {
    value.as_u64().is_some_and(|v| v <= max)
}

fn fits_signed(value: &Value, min: i64, max: i64) -> bool {
    value.as_i64().is_some_and(|v| v >= min && v <= max)
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Bool => "BOOL",
            DataType::Uint8 => "UINT8",
            DataType::Uint16 => "UINT16",
            DataType::Uint32 => "UINT32",
            DataType::Uint64 => "UINT64",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Fp16 => "FP16",
            DataType::Fp32 => "FP32",
            DataType::Fp64 => "FP64",
            DataType::Bytes => "BYTES",
        };
        f.write_str(name)
    }
}

/// Reasons a tensor cannot be built or interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorError {
    /// `data` holds a different number of elements than `shape` describes.
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    /// An element does not match the declared datatype.
    DataTypeMismatch { name: String, datatype: DataType },
    /// Nested arrays of unequal length cannot form a tensor.
    Ragged { name: String },
    /// Elements of different kinds (e.g. numbers and strings) in one value.
    MixedTypes { name: String },
    /// Objects and nulls have no tensor representation.
    Unsupported { name: String },
    /// The shape overflows or expands into too many nested arrays.
    ShapeTooLarge { name: String, shape: Vec<usize> },
}

impl std::fmt::Display for TensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorError::ShapeMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "tensor '{}' has {} elements but its shape requires {}",
                name, actual, expected
            ),
            TensorError::DataTypeMismatch { name, datatype } => {
                write!(f, "tensor '{}' contains values that are not {}", name, datatype)
            }
            TensorError::Ragged { name } => {
                write!(f, "tensor '{}' is not rectangular", name)
            }
            TensorError::MixedTypes { name } => {
                write!(f, "tensor '{}' mixes element types", name)
            }
            TensorError::Unsupported { name } => {
                write!(f, "tensor '{}' contains objects or nulls", name)
            }
            TensorError::ShapeTooLarge { name, shape } => {
                write!(f, "tensor '{}' has an oversized shape {:?}", name, shape)
            }
        }
    }
}

impl std::error::Error for TensorError {}

/// A named tensor as carried in v2 requests and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// Row-major data. Nested arrays are accepted and flattened.
    pub data: Vec<Value>,
}

impl InferTensor {
    /// Number of elements the shape describes, `None` when it overflows.
    ///
    /// The nonzero dimensions must multiply without overflow even when a
    /// zero dimension makes the count 0, so every partial product used
    /// while reshaping fits in `usize`.
    pub fn element_count(&self) -> Option<usize> {
        let nonzero = self
            .shape
            .iter()
            .filter(|&&dim| dim != 0)
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))?;
        if self.shape.contains(&0) {
            Some(0)
        } else {
            Some(nonzero)
        }
    }

    /// Outer arrays built before the first zero dimension.
    fn empty_rows(&self) -> usize {
        self.shape
            .iter()
            .take_while(|&&dim| dim != 0)
            .fold(1usize, |acc, &dim| acc.saturating_mul(dim))
    }

    fn too_large(&self) -> TensorError {
        TensorError::ShapeTooLarge {
            name: self.name.clone(),
            shape: self.shape.clone(),
        }
    }

    /// Data with any nesting flattened away.
    pub fn flat_data(&self) -> Vec<Value> {
        let mut flat = Vec::with_capacity(self.data.len());
        for value in &self.data {
            flatten_into(value, &mut flat);
        }
        flat
    }

    /// Check element count and element types against shape and datatype.
    pub fn validate(&self) -> Result<Vec<Value>, TensorError> {
        let expected = self.element_count().ok_or_else(|| self.too_large())?;
        if self.shape.contains(&0) && self.empty_rows() > MAX_EMPTY_ROWS {
            return Err(self.too_large());
        }
        let flat = self.flat_data();
        if flat.len() != expected {
            return Err(TensorError::ShapeMismatch {
                name: self.name.clone(),
                expected,
                actual: flat.len(),
            });
        }
        if flat.iter().any(|v| !self.datatype.accepts(v)) {
            return Err(TensorError::DataTypeMismatch {
                name: self.name.clone(),
                datatype: self.datatype,
            });
        }
        Ok(flat)
    }

    /// Validate and reshape the data into nested JSON arrays.
    pub fn to_nested(&self) -> Result<Value, TensorError> {
        let flat = self.validate()?;
        Ok(reshape(&flat, &self.shape))
    }

    /// Build a tensor from a nested JSON value, inferring shape and datatype.
    pub fn from_value(name: &str, value: &Value) -> Result<Self, TensorError> {
        let shape = shape_of(name, value)?;
        let mut data = Vec::new();
        flatten_into(value, &mut data);
        let datatype = infer_datatype(name, &data)?;
        Ok(Self {
            name: name.to_string(),
            shape,
            datatype,
            parameters: None,
            data,
        })
    }
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

fn reshape(flat: &[Value], shape: &[usize]) -> Value {
    match shape.split_first() {
        None => flat.first().cloned().unwrap_or(Value::Null),
        Some((&dim, rest)) => {
            let chunk: usize = rest.iter().product();
            let items = (0..dim)
                .map(|i| reshape(&flat[i * chunk..(i + 1) * chunk], rest))
                .collect();
            Value::Array(items)
        }
    }
}

fn shape_of(name: &str, value: &Value) -> Result<Vec<usize>, TensorError> {
    match value {
        Value::Array(items) => {
            let Some(first) = items.first() else {
                return Ok(vec![0]);
            };
            let inner = shape_of(name, first)?;
            for item in &items[1..] {
                if shape_of(name, item)? != inner {
                    return Err(TensorError::Ragged {
                        name: name.to_string(),
                    });
                }
            }
            let mut shape = Vec::with_capacity(inner.len() + 1);
            shape.push(items.len());
            shape.extend(inner);
            Ok(shape)
        }
        _ => Ok(vec![]),
    }
}

fn infer_datatype(name: &str, data: &[Value]) -> Result<DataType, TensorError> {
    if data.iter().any(|v| v.is_null() || v.is_object()) {
        return Err(TensorError::Unsupported {
            name: name.to_string(),
        });
    }
    if data.is_empty() {
        return Ok(DataType::Fp64);
    }
    let datatype = if data.iter().all(Value::is_boolean) {
        DataType::Bool
    } else if data.iter().all(|v| v.is_i64()) {
        DataType::Int64
    } else if data.iter().all(Value::is_number) {
        DataType::Fp64
    } else if data.iter().all(Value::is_string) {
        DataType::Bytes
    } else {
        return Err(TensorError::MixedTypes {
            name: name.to_string(),
        });
    };
    Ok(datatype)
}

/// An output the client asked for by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedOutput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

/// Body of a v2 infer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    pub inputs: Vec<InferTensor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<RequestedOutput>>,
}

/// Body of a v2 infer response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    pub outputs: Vec<InferTensor>,
}

/// Response from `GET /v2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub extensions: Vec<String>,
}

/// Response from `GET /v2/health/live`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerLiveResponse {
    pub live: bool,
}

/// Response from `GET /v2/health/ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerReadyResponse {
    pub ready: bool,
}

/// Declared shape of one model input or output. `-1` marks a variable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub name: String,
    pub datatype: DataType,
    pub shape: Vec<i64>,
}

/// Response from `GET /v2/models/{name}[/versions/{version}]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub inputs: Vec<TensorMetadata>,
    #[serde(default)]
    pub outputs: Vec<TensorMetadata>,
}

impl ModelMetadata {
    /// Metadata carrying only a name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}
