//! Reading and writing [`PsTable`] in the dataset-container and sequential
//! binary formats. The format follows the file suffix.

use super::codec::{
    DatasetContainer, push_array, push_attributes, take_array, take_attributes, take_bytes,
};
use super::{Provenance, PsTable};
use crate::domain::{HaloError, HaloResult};
use crate::numerics::{DenseMatrix, matrix_from_row_major, matrix_to_row_major};
use std::fs;
use std::path::Path;

pub const SEQUENTIAL_MAGIC: &[u8; 8] = b"HALOSEQ1";

const DATASET_Z: &str = "tab_z_ps";
const DATASET_R: &str = "tab_R";
const DATASET_K: &str = "tab_k";
const DATASET_PS: &str = "tab_ps_mm";
const DATASET_CF: &str = "tab_cf_mm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableFormat {
    /// Named datasets in a [`DatasetContainer`].
    Dataset,
    /// `z, R, k, ps_mm, cf_mm, provenance` in fixed order.
    Sequential,
}

impl TableFormat {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Dataset => "dset",
            Self::Sequential => "bin",
        }
    }

    pub fn from_suffix(suffix: &str) -> HaloResult<Self> {
        match suffix {
            "dset" => Ok(Self::Dataset),
            "bin" => Ok(Self::Sequential),
            other => Err(HaloError::format(
                "FORMAT.TABLE_SUFFIX",
                format!("unrecognized table suffix '{}' (expected 'dset' or 'bin')", other),
            )),
        }
    }

    pub fn from_path(path: &Path) -> HaloResult<Self> {
        let suffix = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();
        Self::from_suffix(suffix)
    }
}

/// Writes `table` to `path`. A known suffix on `path` wins over `format`.
pub fn write_table(
    table: &PsTable,
    path: impl AsRef<Path>,
    format: TableFormat,
    overwrite: bool,
) -> HaloResult<()> {
    let path = path.as_ref();
    let resolved = TableFormat::from_path(path)?;
    if resolved != format {
        tracing::warn!(
            path = %path.display(),
            requested = format.suffix(),
            used = resolved.suffix(),
            "table suffix disagrees with requested format"
        );
    }

    if path.exists() && !overwrite {
        return Err(HaloError::io_conflict(
            "IO.TABLE_EXISTS",
            format!("'{}' exists and overwrite was not requested", path.display()),
        ));
    }

    table.validate()?;
    let bytes = match resolved {
        TableFormat::Dataset => encode_container(table)?.encode(),
        TableFormat::Sequential => encode_sequential(table),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| HaloError::io_at("IO.TABLE_DIRECTORY", "create", parent, source))?;
    }
    fs::write(path, bytes).map_err(|source| HaloError::io_at("IO.TABLE_WRITE", "write", path, source))?;

    tracing::info!(path = %path.display(), format = resolved.suffix(), "wrote table");
    Ok(())
}

/// Reads a table, choosing the format from the suffix.
pub fn read_table(path: impl AsRef<Path>) -> HaloResult<PsTable> {
    let path = path.as_ref();
    read_table_as(path, TableFormat::from_path(path)?)
}

pub fn read_table_as(path: impl AsRef<Path>, format: TableFormat) -> HaloResult<PsTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| HaloError::io_at("IO.TABLE_READ", "read", path, source))?;
    let table = match format {
        TableFormat::Dataset => decode_container(&DatasetContainer::decode(&bytes)?)?,
        TableFormat::Sequential => decode_sequential(&bytes)?,
    };
    table.validate()?;
    Ok(table)
}

fn encode_container(table: &PsTable) -> HaloResult<DatasetContainer> {
    let mut container = DatasetContainer::new();
    let nz = table.tab_z.len();
    container.insert(DATASET_Z, vec![nz], table.tab_z.clone())?;
    container.insert(DATASET_R, vec![table.tab_r.len()], table.tab_r.clone())?;
    container.insert(DATASET_K, vec![table.tab_k.len()], table.tab_k.clone())?;
    container.insert(
        DATASET_PS,
        vec![nz, table.tab_k.len()],
        matrix_to_row_major(&table.ps_mm),
    )?;
    container.insert(
        DATASET_CF,
        vec![nz, table.tab_r.len()],
        matrix_to_row_major(&table.cf_mm),
    )?;
    for (key, value) in table.provenance.to_attributes() {
        container.set_attribute(key, value);
    }
    Ok(container)
}

fn decode_container(container: &DatasetContainer) -> HaloResult<PsTable> {
    let tab_z = container.require(DATASET_Z, 1)?.data.clone();
    let tab_r = container.require(DATASET_R, 1)?.data.clone();
    let tab_k = container.require(DATASET_K, 1)?.data.clone();
    let ps = container.require(DATASET_PS, 2)?;
    let cf = container.require(DATASET_CF, 2)?;

    Ok(PsTable {
        ps_mm: matrix_or_error(DATASET_PS, &ps.dims, &ps.data)?,
        cf_mm: matrix_or_error(DATASET_CF, &cf.dims, &cf.data)?,
        tab_z,
        tab_r,
        tab_k,
        provenance: Provenance::from_attributes(container.attributes()),
    })
}

fn encode_sequential(table: &PsTable) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(SEQUENTIAL_MAGIC);
    let nz = table.tab_z.len();
    push_array(&mut bytes, &[nz], &table.tab_z);
    push_array(&mut bytes, &[table.tab_r.len()], &table.tab_r);
    push_array(&mut bytes, &[table.tab_k.len()], &table.tab_k);
    push_array(
        &mut bytes,
        &[nz, table.tab_k.len()],
        &matrix_to_row_major(&table.ps_mm),
    );
    push_array(
        &mut bytes,
        &[nz, table.tab_r.len()],
        &matrix_to_row_major(&table.cf_mm),
    );
    push_attributes(&mut bytes, &table.provenance.to_attributes());
    bytes
}

fn decode_sequential(bytes: &[u8]) -> HaloResult<PsTable> {
    let mut offset = 0;
    if take_bytes(bytes, &mut offset, SEQUENTIAL_MAGIC.len()) != Some(SEQUENTIAL_MAGIC.as_slice()) {
        return Err(HaloError::format(
            "FORMAT.SEQUENTIAL_MAGIC",
            "not a sequential power-spectrum table",
        ));
    }

    let truncated = || HaloError::format("FORMAT.SEQUENTIAL_TRUNCATED", "sequential table is truncated");
    let mut next = |name: &str, ndim: usize| -> HaloResult<(Vec<usize>, Vec<f64>)> {
        let (dims, values) = take_array(bytes, &mut offset).ok_or_else(truncated)?;
        if dims.len() != ndim {
            return Err(HaloError::format(
                "FORMAT.SEQUENTIAL_SHAPE",
                format!("'{}' has {} dimensions, expected {}", name, dims.len(), ndim),
            ));
        }
        Ok((dims, values))
    };

    let (_, tab_z) = next(DATASET_Z, 1)?;
    let (_, tab_r) = next(DATASET_R, 1)?;
    let (_, tab_k) = next(DATASET_K, 1)?;
    let (ps_dims, ps) = next(DATASET_PS, 2)?;
    let (cf_dims, cf) = next(DATASET_CF, 2)?;

    let attributes = take_attributes(bytes, &mut offset).ok_or_else(truncated)?;
    if offset != bytes.len() {
        return Err(HaloError::format(
            "FORMAT.SEQUENTIAL_TRAILING",
            format!("{} trailing bytes after sequential table", bytes.len() - offset),
        ));
    }

    Ok(PsTable {
        tab_z,
        tab_r,
        tab_k,
        ps_mm: matrix_or_error(DATASET_PS, &ps_dims, &ps)?,
        cf_mm: matrix_or_error(DATASET_CF, &cf_dims, &cf)?,
        provenance: Provenance::from_attributes(&attributes),
    })
}

fn matrix_or_error(
    name: &str,
    dims: &[usize],
    values: &[f64],
) -> HaloResult<DenseMatrix> {
    let matrix = match dims {
        [nrows, ncols] => matrix_from_row_major(*nrows, *ncols, values),
        _ => None,
    };
    matrix.ok_or_else(|| {
        HaloError::format(
            "FORMAT.TABLE_SHAPE",
            format!("'{}' does not hold a {:?} matrix", name, dims),
        )
    })
}
