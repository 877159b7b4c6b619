//! Little-endian binary primitives and the named-dataset container.

use crate::domain::{HaloError, HaloResult};

pub const CONTAINER_MAGIC: &[u8; 8] = b"HALODSET";
pub const CONTAINER_VERSION: u32 = 1;

pub(crate) fn push_u32(target: &mut Vec<u8>, value: u32) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_u64(target: &mut Vec<u8>, value: u64) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_f64(target: &mut Vec<u8>, value: f64) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_str(target: &mut Vec<u8>, value: &str) {
    push_u32(target, value.len() as u32);
    target.extend_from_slice(value.as_bytes());
}

/// Shape header (`ndim`, then each extent) followed by the values.
pub(crate) fn push_array(target: &mut Vec<u8>, dims: &[usize], values: &[f64]) {
    push_u32(target, dims.len() as u32);
    for dim in dims {
        push_u64(target, *dim as u64);
    }
    for value in values {
        push_f64(target, *value);
    }
}

pub(crate) fn push_attributes(target: &mut Vec<u8>, attributes: &[(String, String)]) {
    push_u32(target, attributes.len() as u32);
    for (key, value) in attributes {
        push_str(target, key);
        push_str(target, value);
    }
}

pub(crate) fn take_u32(bytes: &[u8], offset: &mut usize) -> Option<u32> {
    let end = offset.checked_add(std::mem::size_of::<u32>())?;
    let slice = bytes.get(*offset..end)?;
    let value = u32::from_le_bytes(slice.try_into().ok()?);
    *offset = end;
    Some(value)
}

pub(crate) fn take_u64(bytes: &[u8], offset: &mut usize) -> Option<u64> {
    let end = offset.checked_add(std::mem::size_of::<u64>())?;
    let slice = bytes.get(*offset..end)?;
    let value = u64::from_le_bytes(slice.try_into().ok()?);
    *offset = end;
    Some(value)
}

pub(crate) fn take_f64(bytes: &[u8], offset: &mut usize) -> Option<f64> {
    let end = offset.checked_add(std::mem::size_of::<f64>())?;
    let slice = bytes.get(*offset..end)?;
    let value = f64::from_le_bytes(slice.try_into().ok()?);
    *offset = end;
    Some(value)
}

pub(crate) fn take_bytes<'a>(bytes: &'a [u8], offset: &mut usize, count: usize) -> Option<&'a [u8]> {
    let end = offset.checked_add(count)?;
    let slice = bytes.get(*offset..end)?;
    *offset = end;
    Some(slice)
}

pub(crate) fn take_str(bytes: &[u8], offset: &mut usize) -> Option<String> {
    let length = take_u32(bytes, offset)? as usize;
    let raw = take_bytes(bytes, offset, length)?;
    String::from_utf8(raw.to_vec()).ok()
}

pub(crate) fn take_array(bytes: &[u8], offset: &mut usize) -> Option<(Vec<usize>, Vec<f64>)> {
    let ndim = take_u32(bytes, offset)? as usize;
    let mut dims = Vec::with_capacity(ndim.min(8));
    for _ in 0..ndim {
        dims.push(usize::try_from(take_u64(bytes, offset)?).ok()?);
    }
    let count = dims
        .iter()
        .try_fold(1_usize, |total, dim| total.checked_mul(*dim))?;
    // Guard the allocation against a corrupt header.
    if count.checked_mul(std::mem::size_of::<f64>())? > bytes.len().saturating_sub(*offset) {
        return None;
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(take_f64(bytes, offset)?);
    }
    Some((dims, values))
}

pub(crate) fn take_attributes(bytes: &[u8], offset: &mut usize) -> Option<Vec<(String, String)>> {
    let count = take_u32(bytes, offset)? as usize;
    let mut attributes = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let key = take_str(bytes, offset)?;
        let value = take_str(bytes, offset)?;
        attributes.push((key, value));
    }
    Some(attributes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

/// Self-describing container of named n-dimensional `f64` datasets plus
/// string attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetContainer {
    datasets: Vec<Dataset>,
    attributes: Vec<(String, String)>,
}

impl DatasetContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a dataset. Fails when `dims` does not match the data.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        dims: Vec<usize>,
        data: Vec<f64>,
    ) -> HaloResult<()> {
        let name = name.into();
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(HaloError::internal(
                "RUN.DATASET_SHAPE",
                format!(
                    "dataset '{}' has {} values but shape {:?}",
                    name,
                    data.len(),
                    dims
                ),
            ));
        }

        let dataset = Dataset { name, dims, data };
        match self.datasets.iter_mut().find(|entry| entry.name == dataset.name) {
            Some(existing) => *existing = dataset,
            None => self.datasets.push(dataset),
        }
        Ok(())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|dataset| dataset.name == name)
    }

    /// Dataset that must exist with exactly `ndim` dimensions.
    pub fn require(&self, name: &str, ndim: usize) -> HaloResult<&Dataset> {
        let dataset = self.get(name).ok_or_else(|| {
            HaloError::format(
                "FORMAT.DATASET_MISSING",
                format!("container has no dataset '{}'", name),
            )
        })?;
        if dataset.dims.len() != ndim {
            return Err(HaloError::format(
                "FORMAT.DATASET_SHAPE",
                format!(
                    "dataset '{}' has {} dimensions, expected {}",
                    name,
                    dataset.dims.len(),
                    ndim
                ),
            ));
        }
        Ok(dataset)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|dataset| dataset.name.as_str())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(CONTAINER_MAGIC);
        push_u32(&mut bytes, CONTAINER_VERSION);
        push_u32(&mut bytes, self.datasets.len() as u32);
        for dataset in &self.datasets {
            push_str(&mut bytes, &dataset.name);
            push_array(&mut bytes, &dataset.dims, &dataset.data);
        }
        push_attributes(&mut bytes, &self.attributes);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> HaloResult<Self> {
        let mut offset = 0;
        let magic = take_bytes(bytes, &mut offset, CONTAINER_MAGIC.len());
        if magic != Some(CONTAINER_MAGIC.as_slice()) {
            return Err(HaloError::format(
                "FORMAT.CONTAINER_MAGIC",
                "not a dataset container",
            ));
        }
        let version = take_u32(bytes, &mut offset).ok_or_else(truncated)?;
        if version != CONTAINER_VERSION {
            return Err(HaloError::format(
                "FORMAT.CONTAINER_VERSION",
                format!("unsupported container version {}", version),
            ));
        }

        let count = take_u32(bytes, &mut offset).ok_or_else(truncated)? as usize;
        let mut datasets = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let name = take_str(bytes, &mut offset).ok_or_else(truncated)?;
            let (dims, data) = take_array(bytes, &mut offset).ok_or_else(truncated)?;
            datasets.push(Dataset { name, dims, data });
        }
        let attributes = take_attributes(bytes, &mut offset).ok_or_else(truncated)?;

        if offset != bytes.len() {
            return Err(HaloError::format(
                "FORMAT.CONTAINER_TRAILING",
                format!("{} trailing bytes after container", bytes.len() - offset),
            ));
        }

        Ok(Self {
            datasets,
            attributes,
        })
    }
}

fn truncated() -> HaloError {
    HaloError::format("FORMAT.CONTAINER_TRUNCATED", "dataset container is truncated")
}
