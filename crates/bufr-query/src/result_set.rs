//! Accumulated frames and dense extraction.
//!
//! Every collected message contributes one [`DataFrame`] holding one
//! [`DataField`] per query-set variable. [`ResultSet::get`] turns the
//! ragged per-message data for one variable into a dense row-major
//! array, padding short repetitions with missing markers and optionally
//! re-shaping rows around a group-by field.

use crate::error::{QueryError, Result};
use crate::lookup::DataVector;
use crate::target::{SeqCounts, Target};
use crate::MISSING_VALUE;
use std::sync::Arc;
use tracing::debug;

/// One variable's collected data within one message.
#[derive(Debug, Clone)]
pub struct DataField {
    pub target: Arc<Target>,
    /// Decoded values in depth-first storage order, post-filter.
    pub data: DataVector,
    /// Per-level repeat counts as kept after filtering.
    pub seq_counts: SeqCounts,
    /// True when the field produced no data for this message.
    pub missing: bool,
    /// True when any path level carried an occurrence filter.
    pub filtered: bool,
}

/// All fields collected from one message.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    fields: Vec<DataField>,
}

impl DataFrame {
    pub fn new(fields: Vec<DataField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    /// Position of a variable within this frame.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.target.name == name)
    }
}

/// Dense extraction result for one variable.
#[derive(Debug, Clone)]
pub struct DataObject {
    pub field_name: String,
    pub group_by_field_name: Option<String>,
    pub values: FieldValues,
    /// Row-major dimension sizes; the first is the row axis.
    pub dims: Vec<usize>,
    /// One label per dimension.
    pub dim_paths: Vec<String>,
}

/// Typed dense values, selected from the field's unit.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Float(Vec<f32>),
    Uint(Vec<u32>),
    Text(Vec<String>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Float(v) => v.len(),
            FieldValues::Uint(v) => v.len(),
            FieldValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frames accumulated over a run, queried per variable.
#[derive(Debug, Default)]
pub struct ResultSet {
    frames: Vec<DataFrame>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, frame: DataFrame) {
        self.frames.push(frame);
    }

    /// Number of accumulated frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Extracts one variable across all frames as a dense row-major
    /// array, optionally grouped by another variable.
    pub fn get(&self, field_name: &str, group_by: Option<&str>) -> Result<DataObject> {
        if self.frames.is_empty() {
            return Err(QueryError::Empty);
        }

        let field_idx = self
            .field_index(field_name)
            .ok_or_else(|| QueryError::UnknownField(field_name.to_string()))?;
        let group_idx = group_by
            .map(|name| {
                self.field_index(name)
                    .ok_or_else(|| QueryError::UnknownField(name.to_string()))
            })
            .transpose()?;

        if let (Some(g_idx), Some(g_name)) = (group_idx, group_by) {
            let grouped_filtered = self
                .frames
                .iter()
                .any(|frame| frame.fields[g_idx].filtered);
            if grouped_filtered {
                return Err(QueryError::invalid_query(
                    g_name,
                    "cannot group by a field with occurrence filters",
                ));
            }
        }

        let shape = self.discover_shape(field_idx, group_idx);
        debug!(
            field = field_name,
            dims = ?shape.dims,
            rows_per_frame = shape.dims.first().copied().unwrap_or(0),
            "extracting field"
        );
        self.assemble(field_name, group_by, field_idx, shape)
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.frames.iter().find_map(|frame| frame.field_index(name))
    }

    // Cross-frame shape discovery: per-level maxima of the field's
    // counts, the widest dimension labelling seen, and the group-by
    // re-shaping of both.
    fn discover_shape(&self, field_idx: usize, group_idx: Option<usize>) -> Shape {
        let mut all_dims: Vec<usize> = Vec::new();
        let mut export_dims: Vec<usize> = Vec::new();
        let mut dim_paths: Vec<String> = Vec::new();
        let mut groupby_levels = 0usize;
        let mut group_export_len = 0usize;
        let mut group_label = String::new();
        let mut total_groupby_elements = 0usize;

        for frame in &self.frames {
            let field = &frame.fields[field_idx];
            if field.target.dim_paths.len() > dim_paths.len() {
                dim_paths = field.target.dim_paths.clone();
                export_dims = field.target.export_dims.clone();
            }
            for level in 0..field.seq_counts.len() {
                let m = field.seq_counts.max_at(level);
                if level < all_dims.len() {
                    all_dims[level] = all_dims[level].max(m);
                } else {
                    all_dims.push(m);
                }
            }

            if let Some(g_idx) = group_idx {
                let group = &frame.fields[g_idx];
                groupby_levels = groupby_levels.max(group.seq_counts.len());
                group_export_len = group_export_len.max(group.target.export_dims.len());
                if let Some(label) = group.target.dim_paths.last() {
                    if group_label.is_empty() {
                        group_label = label.clone();
                    }
                }
                let elements: usize = (0..group.seq_counts.len())
                    .map(|level| group.seq_counts.max_at(level).max(1))
                    .product();
                total_groupby_elements = total_groupby_elements.max(elements);
            }
        }

        // A level with no occurrences anywhere still spans one padded slot.
        for dim in all_dims.iter_mut() {
            *dim = (*dim).max(1);
        }

        let mut dims = all_dims.clone();
        if group_idx.is_some() {
            if groupby_levels > all_dims.len() {
                // Group field repeats deeper than the target; every group
                // element gets one broadcast row.
                dims = vec![total_groupby_elements.max(1)];
                export_dims = vec![0];
                dim_paths = vec![group_label];
            } else {
                let leading: usize = all_dims[..groupby_levels].iter().product();
                dims = Vec::with_capacity(all_dims.len() - groupby_levels + 1);
                dims.push(leading);
                dims.extend_from_slice(&all_dims[groupby_levels..]);

                let shift = groupby_levels.saturating_sub(1);
                let mut renumbered: Vec<usize> = export_dims
                    .iter()
                    .filter_map(|&e| (e as isize - shift as isize).try_into().ok())
                    .collect();
                if renumbered.first() != Some(&0) {
                    renumbered.insert(0, 0);
                }
                export_dims = renumbered;
                let start = group_export_len.saturating_sub(1).min(dim_paths.len());
                dim_paths = dim_paths[start..].to_vec();
            }
        }

        Shape {
            all_dims,
            dims,
            export_dims,
            dim_paths,
            groupby_levels: group_idx.map(|_| groupby_levels).unwrap_or(0),
        }
    }

    fn assemble(
        &self,
        field_name: &str,
        group_by: Option<&str>,
        field_idx: usize,
        shape: Shape,
    ) -> Result<DataObject> {
        let rows_per_frame = shape.dims.first().copied().unwrap_or(1).max(1);
        let row_len: usize = shape.dims[1..].iter().product();
        let total_rows = rows_per_frame * self.frames.len();

        let reference = self.reference_field(field_idx);
        let is_text = reference.target.type_info.is_string();
        let mut dense = DataVector::missing_filled(is_text, total_rows * row_len);

        for (frame_idx, frame) in self.frames.iter().enumerate() {
            let field = &frame.fields[field_idx];
            if field.missing {
                continue;
            }
            if field.data.is_text() != is_text {
                return Err(QueryError::type_mismatch(
                    field_name,
                    "frames disagree on character versus numeric content",
                ));
            }
            let rows = rows_for_field(field, &shape, field_name, frame_idx)?;
            for (row_idx, row) in rows.iter().enumerate().take(rows_per_frame) {
                let base = (frame_idx * rows_per_frame + row_idx) * row_len;
                for col in 0..row.len().min(row_len) {
                    dense.set_from(row, col, base + col);
                }
            }
        }

        let mut dims = shape.dims;
        dims[0] = total_rows;

        let mut final_dims: Vec<usize> = shape
            .export_dims
            .iter()
            .filter(|&&e| e < dims.len())
            .map(|&e| dims[e])
            .collect();
        if final_dims.is_empty() {
            final_dims = vec![total_rows];
        }
        let mut final_paths: Vec<String> = (0..final_dims.len())
            .map(|i| shape.dim_paths.get(i).cloned().unwrap_or_default())
            .collect();
        if let Some(first) = final_paths.first_mut() {
            if first.is_empty() {
                *first = "*".to_string();
            }
        }

        let values = typed_values(&reference.target, dense, field_name)?;
        Ok(DataObject {
            field_name: field_name.to_string(),
            group_by_field_name: group_by.map(|s| s.to_string()),
            values,
            dims: final_dims,
            dim_paths: final_paths,
        })
    }

    // Unit and kind come from the first frame that actually resolved the
    // field; a run of pure placeholders falls back to the first frame.
    fn reference_field(&self, field_idx: usize) -> &DataField {
        self.frames
            .iter()
            .map(|frame| &frame.fields[field_idx])
            .find(|field| !field.target.is_placeholder())
            .unwrap_or(&self.frames[0].fields[field_idx])
    }
}

struct Shape {
    /// Per-level maxima across frames, every level forced to at least 1.
    all_dims: Vec<usize>,
    /// Output dimensions after group-by adjustment; `dims[0]` is rows per
    /// frame until [`ResultSet::assemble`] rescales it to total rows.
    dims: Vec<usize>,
    export_dims: Vec<usize>,
    dim_paths: Vec<String>,
    /// Count levels collapsed into the row axis; 0 without group-by.
    groupby_levels: usize,
}

/// Inflates one frame's ragged data to the padded shape and splits it
/// into rows.
fn rows_for_field(
    field: &DataField,
    shape: &Shape,
    field_name: &str,
    frame_idx: usize,
) -> Result<Vec<DataVector>> {
    let seq = &field.seq_counts;

    // Group field repeats deeper than this one: broadcast the field's
    // single value across every group row.
    if shape.groupby_levels > seq.len() {
        let rows_needed = shape.dims.first().copied().unwrap_or(1);
        let mut rows = Vec::with_capacity(rows_needed);
        for _ in 0..rows_needed {
            let mut row = field.data.empty_like();
            row.push_from(&field.data, 0);
            rows.push(row);
        }
        return Ok(rows);
    }

    let total: usize = shape.all_dims.iter().product();
    let mut suffix = vec![1usize; shape.all_dims.len() + 1];
    for level in (0..shape.all_dims.len()).rev() {
        suffix[level] = suffix[level + 1] * shape.all_dims[level];
    }

    // Pad short repetitions in place: walk levels deepest first, and for
    // each occurrence-instance shift every element at or past its padded
    // block end by the instance's shortfall.
    let mut idxs: Vec<usize> = (0..field.data.len()).collect();
    let deepest = shape.all_dims.len().min(seq.len());
    for level in (0..deepest).rev() {
        let deeper = suffix[level + 1];
        let block = suffix[level];
        for (instance, &count) in seq.level(level).iter().enumerate() {
            let used = count * deeper;
            if used > block {
                return Err(QueryError::shape_inconsistency(
                    field_name,
                    frame_idx,
                    format!("level {level} holds {count} occurrences, shape allows {}", block / deeper.max(1)),
                ));
            }
            let inserts = block - used;
            if inserts == 0 {
                continue;
            }
            let insert_at = block * instance + used;
            for idx in idxs.iter_mut() {
                if *idx >= insert_at {
                    *idx += inserts;
                }
            }
        }
    }

    let mut output = DataVector::missing_filled(field.data.is_text(), total);
    for (element, &idx) in idxs.iter().enumerate() {
        if idx >= total {
            return Err(QueryError::shape_inconsistency(
                field_name,
                frame_idx,
                "repeat counts exceed the discovered shape",
            ));
        }
        output.set_from(&field.data, element, idx);
    }

    if shape.groupby_levels == 0 {
        return Ok(vec![output]);
    }

    let nums_per_row: usize = shape.all_dims[shape.groupby_levels..].iter().product();
    let num_rows: usize = shape.all_dims[..shape.groupby_levels].iter().product();
    let rows = (0..num_rows)
        .map(|row| output.chunk(row * nums_per_row, nums_per_row))
        .collect();
    Ok(rows)
}

// Output kind follows the unit: character units stay text, inherently
// whole-number units become unsigned, everything else becomes float.
fn typed_values(target: &Target, dense: DataVector, field_name: &str) -> Result<FieldValues> {
    if target.type_info.is_string() {
        match dense {
            DataVector::Text(values) => Ok(FieldValues::Text(values)),
            DataVector::Numeric(_) => Err(QueryError::type_mismatch(
                field_name,
                "character field produced numeric data",
            )),
        }
    } else {
        let values = match dense {
            DataVector::Numeric(values) => values,
            DataVector::Text(_) => {
                return Err(QueryError::type_mismatch(
                    field_name,
                    "numeric field produced character data",
                ))
            }
        };
        if target.type_info.is_integral() {
            Ok(FieldValues::Uint(
                values
                    .iter()
                    .map(|&v| {
                        if v == MISSING_VALUE {
                            u32::MAX
                        } else {
                            v as u32
                        }
                    })
                    .collect(),
            ))
        } else {
            Ok(FieldValues::Float(values.iter().map(|&v| v as f32).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TypeInfo;
    use crate::target::TargetComponent;

    fn numeric_target(name: &str, levels: usize) -> Arc<Target> {
        // Hand-built target with one exported dimension per level.
        let mut dim_paths = vec!["*".to_string()];
        for level in 1..levels {
            dim_paths.push(format!("*/SEG{level}"));
        }
        Arc::new(Target {
            name: name.to_string(),
            query_str: format!("*/{name}"),
            node_id: 99,
            path: Vec::new(),
            type_info: TypeInfo {
                unit: "K".into(),
                scale: 0,
                reference: 0,
                bits: 16,
            },
            long_str_id: format!("{name}#1"),
            export_dims: (0..levels).collect(),
            dim_paths,
        })
    }

    fn field(target: &Arc<Target>, data: Vec<f64>, levels: Vec<Vec<usize>>) -> DataField {
        DataField {
            target: target.clone(),
            data: DataVector::Numeric(data),
            seq_counts: SeqCounts::new(levels),
            missing: false,
            filtered: false,
        }
    }

    #[test]
    fn empty_result_set_reports_empty() {
        let rs = ResultSet::new();
        assert!(matches!(rs.get("temperature", None), Err(QueryError::Empty)));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let target = numeric_target("temperature", 1);
        let mut rs = ResultSet::new();
        rs.push_frame(DataFrame::new(vec![field(&target, vec![1.0], vec![vec![1]])]));
        assert!(matches!(
            rs.get("pressure", None),
            Err(QueryError::UnknownField(_))
        ));
    }

    #[test]
    fn scalar_field_concatenates_across_frames() {
        let target = numeric_target("temperature", 1);
        let mut rs = ResultSet::new();
        for v in [271.5, 272.0, 268.25] {
            rs.push_frame(DataFrame::new(vec![field(&target, vec![v], vec![vec![1]])]));
        }
        let obj = rs.get("temperature", None).unwrap();
        assert_eq!(obj.dims, vec![3]);
        assert_eq!(obj.dim_paths, vec!["*"]);
        assert_eq!(
            obj.values,
            FieldValues::Float(vec![271.5, 272.0, 268.25])
        );
    }

    #[test]
    fn short_repetitions_pad_with_missing() {
        let target = numeric_target("temperature", 2);
        let mut rs = ResultSet::new();
        rs.push_frame(DataFrame::new(vec![field(
            &target,
            vec![1.0, 2.0, 3.0],
            vec![vec![1], vec![3]],
        )]));
        rs.push_frame(DataFrame::new(vec![field(
            &target,
            vec![4.0, 5.0],
            vec![vec![1], vec![2]],
        )]));
        let obj = rs.get("temperature", None).unwrap();
        assert_eq!(obj.dims, vec![2, 3]);
        let sentinel = MISSING_VALUE as f32;
        assert_eq!(
            obj.values,
            FieldValues::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, sentinel])
        );
    }

    #[test]
    fn missing_frame_stays_sentinel() {
        let target = numeric_target("temperature", 1);
        let mut rs = ResultSet::new();
        rs.push_frame(DataFrame::new(vec![field(&target, vec![7.0], vec![vec![1]])]));
        let mut absent = field(&target, vec![], vec![vec![1]]);
        absent.missing = true;
        rs.push_frame(DataFrame::new(vec![absent]));
        let obj = rs.get("temperature", None).unwrap();
        assert_eq!(obj.dims, vec![2]);
        assert_eq!(
            obj.values,
            FieldValues::Float(vec![7.0, MISSING_VALUE as f32])
        );
    }

    #[test]
    fn group_by_same_depth_flattens_rows() {
        let temp = numeric_target("temperature", 2);
        let pres = numeric_target("pressure", 2);
        let mut rs = ResultSet::new();
        rs.push_frame(DataFrame::new(vec![
            field(&temp, vec![1.0, 2.0], vec![vec![1], vec![2]]),
            field(&pres, vec![900.0, 850.0], vec![vec![1], vec![2]]),
        ]));
        let obj = rs.get("temperature", Some("pressure")).unwrap();
        assert_eq!(obj.dims, vec![2]);
        assert_eq!(obj.dim_paths, vec!["*/SEG1"]);
        assert_eq!(obj.values, FieldValues::Float(vec![1.0, 2.0]));
    }

    #[test]
    fn group_by_deeper_field_broadcasts_scalar() {
        let station = numeric_target("station", 1);
        let temp = numeric_target("temperature", 2);
        let mut rs = ResultSet::new();
        rs.push_frame(DataFrame::new(vec![
            field(&station, vec![42.0], vec![vec![1]]),
            field(&temp, vec![1.0, 2.0, 3.0], vec![vec![1], vec![3]]),
        ]));
        let obj = rs.get("station", Some("temperature")).unwrap();
        assert_eq!(obj.dims, vec![3]);
        assert_eq!(obj.values, FieldValues::Float(vec![42.0, 42.0, 42.0]));
    }

    #[test]
    fn group_by_filtered_field_is_rejected() {
        let temp = numeric_target("temperature", 2);
        let pres = numeric_target("pressure", 2);
        let mut rs = ResultSet::new();
        let mut pres_field = field(&pres, vec![900.0], vec![vec![1], vec![1]]);
        pres_field.filtered = true;
        rs.push_frame(DataFrame::new(vec![
            field(&temp, vec![1.0, 2.0], vec![vec![1], vec![2]]),
            pres_field,
        ]));
        assert!(matches!(
            rs.get("temperature", Some("pressure")),
            Err(QueryError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn integral_units_come_back_unsigned() {
        let mut rs = ResultSet::new();
        let target = Arc::new(Target {
            type_info: TypeInfo {
                unit: "CODE TABLE".into(),
                scale: 0,
                reference: 0,
                bits: 8,
            },
            ..(*numeric_target("kind", 1)).clone()
        });
        rs.push_frame(DataFrame::new(vec![field(&target, vec![3.0], vec![vec![1]])]));
        let mut absent = field(&target, vec![], vec![vec![1]]);
        absent.missing = true;
        rs.push_frame(DataFrame::new(vec![absent]));
        let obj = rs.get("kind", None).unwrap();
        assert_eq!(obj.values, FieldValues::Uint(vec![3, u32::MAX]));
    }

    #[test]
    fn inconsistent_counts_surface_shape_error() {
        let target = numeric_target("temperature", 2);
        let mut rs = ResultSet::new();
        // Second level claims more occurrences than its data carries room
        // for once another frame fixes the padded shape smaller.
        let bad = DataField {
            target: target.clone(),
            data: DataVector::Numeric(vec![1.0, 2.0, 3.0]),
            seq_counts: SeqCounts::new(vec![vec![1], vec![3]]),
            missing: false,
            filtered: false,
        };
        let shape = Shape {
            all_dims: vec![1, 2],
            dims: vec![1, 2],
            export_dims: vec![0, 1],
            dim_paths: vec!["*".into(), "*/SEG1".into()],
            groupby_levels: 0,
        };
        let err = rows_for_field(&bad, &shape, "temperature", 0).unwrap_err();
        assert!(matches!(err, QueryError::ShapeInconsistency { .. }));
    }
}
