use std::{collections::HashMap, fs, path::Path};

use bytemuck::{Pod, Zeroable};
use half::{bf16, f16};
use safetensors::{SafeTensors, tensor::Dtype};
use serde::Serialize;
use tch::{Device, Tensor, nn::VarStore};
use tracing::warn;

use crate::error::ServiceError;

const NESTED_KEYS: [&str; 2] = ["model_state_dict.", "state_dict."];
const COMPILED_PREFIX: &str = "_orig_mod.";

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub strict: bool,
    pub copied: usize,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub mismatched: Vec<String>,
}

impl LoadReport {
    // A head sized for a different label set must not be served.
    pub fn require_matching_shapes(self) -> Result<Self, ServiceError> {
        if !self.mismatched.is_empty() {
            return Err(ServiceError::Checkpoint(format!(
                "shape mismatch for {:?}",
                self.mismatched
            )));
        }
        if self.copied == 0 {
            return Err(ServiceError::Checkpoint(
                "checkpoint shares no parameters with the model".into(),
            ));
        }
        Ok(self)
    }
}

pub fn read_checkpoint(path: &Path, device: Device) -> Result<HashMap<String, Tensor>, ServiceError> {
    let is_safetensors = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("safetensors"));

    if is_safetensors {
        read_safetensors(path)
    } else {
        let named = Tensor::load_multi_with_device(path, device)
            .map_err(|e| ServiceError::Checkpoint(format!("{}: {e}", path.display())))?;
        Ok(named.into_iter().collect())
    }
}

fn read_safetensors(path: &Path) -> Result<HashMap<String, Tensor>, ServiceError> {
    let bytes = fs::read(path)?;
    let st = SafeTensors::deserialize(&bytes)
        .map_err(|e| ServiceError::Checkpoint(format!("{}: {e}", path.display())))?;

    let mut map = HashMap::new();
    for (name, view) in st.tensors() {
        let shape: Vec<i64> = view.shape().iter().map(|&d| d as i64).collect();
        let data = view.data();
        // safetensors payloads are not guaranteed to be aligned for the element type
        let tensor = match view.dtype() {
            Dtype::F32 => Tensor::from_slice(&cast_vec::<f32>(data)),
            Dtype::F64 => Tensor::from_slice(&cast_vec::<f64>(data)),
            Dtype::F16 => {
                let values: Vec<f32> = cast_vec::<u16>(data)
                    .into_iter()
                    .map(|h| f16::from_bits(h).to_f32())
                    .collect();
                Tensor::from_slice(&values)
            }
            Dtype::BF16 => {
                let values: Vec<f32> = cast_vec::<u16>(data)
                    .into_iter()
                    .map(|h| bf16::from_bits(h).to_f32())
                    .collect();
                Tensor::from_slice(&values)
            }
            Dtype::I64 => Tensor::from_slice(&cast_vec::<i64>(data)),
            other => {
                warn!(tensor = %name, dtype = ?other, "skipping tensor with unsupported dtype");
                continue;
            }
        };
        map.insert(name, tensor.reshape(shape.as_slice()));
    }
    Ok(map)
}

fn cast_vec<T: Pod>(data: &[u8]) -> Vec<T> {
    let width = std::mem::size_of::<T>();
    let mut out = vec![T::zeroed(); data.len() / width];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&data[..out.len() * width]);
    out
}

pub fn extract_state_dict<V>(raw: HashMap<String, V>) -> HashMap<String, V> {
    let mut state = raw;

    for nested in NESTED_KEYS {
        if state.keys().any(|k| k.starts_with(nested)) {
            state = state
                .into_iter()
                .filter_map(|(k, v)| k.strip_prefix(nested).map(|rest| (rest.to_string(), v)))
                .collect();
            break;
        }
    }

    if state.keys().any(|k| k.contains(COMPILED_PREFIX)) {
        state = state
            .into_iter()
            .map(|(k, v)| (k.replace(COMPILED_PREFIX, ""), v))
            .collect();
    }
    state
}

pub fn load_into(vs: &mut VarStore, state: &HashMap<String, Tensor>) -> LoadReport {
    match load_strict(vs, state) {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "strict checkpoint load failed, retrying tolerant");
            load_tolerant(vs, state)
        }
    }
}

pub fn load_strict(
    vs: &mut VarStore,
    state: &HashMap<String, Tensor>,
) -> Result<LoadReport, ServiceError> {
    let plan = plan_copy(vs, state);
    if !plan.missing.is_empty() || !plan.unexpected.is_empty() || !plan.mismatched.is_empty() {
        return Err(ServiceError::Checkpoint(format!(
            "missing keys {:?}, unexpected keys {:?}, shape mismatches {:?}",
            plan.missing, plan.unexpected, plan.mismatched
        )));
    }
    let mut report = load_tolerant(vs, state);
    report.strict = true;
    Ok(report)
}

pub fn load_tolerant(vs: &mut VarStore, state: &HashMap<String, Tensor>) -> LoadReport {
    let mut report = plan_copy(vs, state);
    let mut variables = vs.variables();
    tch::no_grad(|| {
        for (name, dst) in variables.iter_mut() {
            let Some(src) = state.get(name) else { continue };
            if src.size() != dst.size() {
                continue;
            }
            dst.copy_(&src.to_device(dst.device()).to_kind(dst.kind()));
            report.copied += 1;
        }
    });
    report
}

fn plan_copy(vs: &VarStore, state: &HashMap<String, Tensor>) -> LoadReport {
    let variables = vs.variables();
    let mut report = LoadReport::default();

    for (name, dst) in &variables {
        match state.get(name) {
            None => report.missing.push(name.clone()),
            Some(src) if src.size() != dst.size() => report.mismatched.push(name.clone()),
            Some(_) => {}
        }
    }
    report.unexpected = state
        .keys()
        .filter(|k| !variables.contains_key(*k))
        .cloned()
        .collect();

    report.missing.sort();
    report.unexpected.sort();
    report.mismatched.sort();
    report
}

pub fn load_file(vs: &mut VarStore, path: &Path) -> Result<LoadReport, ServiceError> {
    let raw = read_checkpoint(path, vs.device())?;
    let state = extract_state_dict(raw);
    Ok(load_into(vs, &state))
}
