//! Boundary (de)serialization for the two protocols.
//!
//! Both protocols are reduced to the same canonical payload before a backend
//! is invoked: a JSON object shaped like a v1 body. A v2 request with one
//! input tensor becomes `{"instances": <tensor as nested arrays>}`, so a v1
//! client and a v2 client sending the same data hit the model with the same
//! value.

use model_server_common::{InferTensor, InferenceRequest, RequestedOutput};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Parse a v1 predict/explain body. The shape is model-defined, but it must
/// be a JSON object.
pub fn parse_v1_body(body: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("unrecognized request format: {}", e)))?;
    if !value.is_object() {
        return Err(Error::InvalidInput(
            "request body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Parse a v2 infer body.
pub fn parse_v2_body(body: &[u8]) -> Result<InferenceRequest> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("invalid inference request: {}", e)))
}

/// Convert a v2 request into the canonical payload.
pub fn v2_request_to_payload(request: &InferenceRequest) -> Result<Value> {
    let mut payload = Map::new();

    match request.inputs.as_slice() {
        [] => {
            return Err(Error::InvalidInput(
                "inference request has no inputs".to_string(),
            ))
        }
        [single] => {
            payload.insert("instances".to_string(), tensor_to_nested(single)?);
        }
        many => {
            let mut inputs = Map::new();
            for tensor in many {
                if inputs.contains_key(&tensor.name) {
                    return Err(Error::InvalidInput(format!(
                        "duplicate input tensor '{}'",
                        tensor.name
                    )));
                }
                inputs.insert(tensor.name.clone(), tensor_to_nested(tensor)?);
            }
            payload.insert("inputs".to_string(), Value::Object(inputs));
        }
    }

    if let Some(parameters) = &request.parameters {
        payload.insert("parameters".to_string(), Value::Object(parameters.clone()));
    }

    Ok(Value::Object(payload))
}

fn tensor_to_nested(tensor: &InferTensor) -> Result<Value> {
    tensor
        .to_nested()
        .map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Convert a canonical result into v2 output tensors.
///
/// Each top-level field of an object result becomes one tensor named after
/// the field; any other result becomes a single `output-0` tensor. When the
/// client listed the outputs it wants, only those are returned.
pub fn payload_to_v2_outputs(
    payload: &Value,
    requested: Option<&[RequestedOutput]>,
) -> Result<Vec<InferTensor>> {
    let mut outputs = match payload {
        Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| output_tensor(name, value))
            .collect::<Result<Vec<_>>>()?,
        other => vec![output_tensor("output-0", other)?],
    };

    if let Some(requested) = requested {
        let mut selected: Vec<InferTensor> = Vec::with_capacity(requested.len());
        for wanted in requested {
            if selected.iter().any(|t| t.name == wanted.name) {
                return Err(Error::InvalidInput(format!(
                    "output '{}' is requested more than once",
                    wanted.name
                )));
            }
            let position = outputs
                .iter()
                .position(|t| t.name == wanted.name)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("model has no output named '{}'", wanted.name))
                })?;
            let mut tensor = outputs.swap_remove(position);
            tensor.parameters = wanted.parameters.clone();
            selected.push(tensor);
        }
        outputs = selected;
    }

    Ok(outputs)
}

fn output_tensor(name: &str, value: &Value) -> Result<InferTensor> {
    InferTensor::from_value(name, value)
        .map_err(|e| Error::Inference(format!("model output cannot be encoded: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_server_common::DataType;
    use serde_json::json;

    fn request(json: Value) -> InferenceRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_v1_body_must_be_object() {
        assert!(parse_v1_body(br#"{"instances": [1]}"#).is_ok());
        assert!(matches!(
            parse_v1_body(b"[1, 2]"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse_v1_body(b"not json"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_v2_body_requires_inputs_field() {
        assert!(matches!(
            parse_v2_body(br#"{"id": "1"}"#),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_single_input_becomes_instances() {
        let req = request(json!({
            "parameters": {"threshold": 0.5},
            "inputs": [{"name": "x", "shape": [2, 2], "datatype": "INT32", "data": [1, 2, 3, 4]}]
        }));

        let payload = v2_request_to_payload(&req).unwrap();
        assert_eq!(
            payload,
            json!({"instances": [[1, 2], [3, 4]], "parameters": {"threshold": 0.5}})
        );
    }

    #[test]
    fn test_multiple_inputs_are_keyed_by_name() {
        let req = request(json!({
            "inputs": [
                {"name": "a", "shape": [2], "datatype": "FP32", "data": [1.0, 2.0]},
                {"name": "b", "shape": [1], "datatype": "BYTES", "data": ["x"]}
            ]
        }));

        let payload = v2_request_to_payload(&req).unwrap();
        assert_eq!(payload, json!({"inputs": {"a": [1.0, 2.0], "b": ["x"]}}));
    }

    #[test]
    fn test_invalid_tensors_are_invalid_input() {
        let empty = request(json!({"inputs": []}));
        assert!(matches!(
            v2_request_to_payload(&empty),
            Err(Error::InvalidInput(_))
        ));

        let mismatched = request(json!({
            "inputs": [{"name": "x", "shape": [3], "datatype": "FP32", "data": [1.0]}]
        }));
        assert!(matches!(
            v2_request_to_payload(&mismatched),
            Err(Error::InvalidInput(_))
        ));

        let duplicated = request(json!({
            "inputs": [
                {"name": "x", "shape": [1], "datatype": "FP32", "data": [1.0]},
                {"name": "x", "shape": [1], "datatype": "FP32", "data": [2.0]}
            ]
        }));
        assert!(matches!(
            v2_request_to_payload(&duplicated),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_object_result_fields_become_outputs() {
        let outputs = payload_to_v2_outputs(
            &json!({"predictions": [[0.1, 0.9], [0.8, 0.2]]}),
            None,
        )
        .unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name, "predictions");
        assert_eq!(outputs[0].shape, vec![2, 2]);
        assert_eq!(outputs[0].datatype, DataType::Fp64);
        assert_eq!(outputs[0].data, vec![json!(0.1), json!(0.9), json!(0.8), json!(0.2)]);
    }

    #[test]
    fn test_scalar_result_becomes_output_zero() {
        let outputs = payload_to_v2_outputs(&json!([1, 2, 3]), None).unwrap();
        assert_eq!(outputs[0].name, "output-0");
        assert_eq!(outputs[0].datatype, DataType::Int64);
    }

    #[test]
    fn test_requested_outputs_filter() {
        let payload = json!({"predictions": [1], "scores": [0.5]});
        let requested = vec![RequestedOutput {
            name: "scores".to_string(),
            parameters: None,
        }];

        let outputs = payload_to_v2_outputs(&payload, Some(&requested)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name, "scores");

        let missing = vec![RequestedOutput {
            name: "labels".to_string(),
            parameters: None,
        }];
        assert!(matches!(
            payload_to_v2_outputs(&payload, Some(&missing)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_duplicate_requested_output() {
        let payload = json!({"predictions": [1]});
        let requested = vec![
            RequestedOutput {
                name: "predictions".to_string(),
                parameters: None,
            },
            RequestedOutput {
                name: "predictions".to_string(),
                parameters: None,
            },
        ];

        match payload_to_v2_outputs(&payload, Some(&requested)) {
            Err(Error::InvalidInput(message)) => assert!(message.contains("more than once")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_ragged_result_is_inference_error() {
        assert!(matches!(
            payload_to_v2_outputs(&json!({"predictions": [[1], [2, 3]]}), None),
            Err(Error::Inference(_))
        ));
    }
}
