//! Selection report and predictor specification (spec §4.8 "Output").

use serde::Serialize;

use crate::attribute::AttributeIndex;
use crate::schema::AttributeSchema;
use crate::selection::WeightedSelection;

/// One kept attribute: its final weight and importance.
///
/// `importance` combines weight and univariate level as `sqrt(weight *
/// level)` (the geometric mean of the two signals the selection produced
/// and the preparation stage measured independently): the base class that
/// computes the reference metric is not part of the retrieval pack, so this
/// is a documented choice rather than a literal port.
#[derive(Debug, Clone, Serialize)]
pub struct KeptAttributeReport {
    pub native_name: String,
    pub recoded_name: String,
    pub weight: f64,
    pub level: f64,
    pub importance: f64,
}

/// The selection report: every kept attribute plus the used-attribute count
/// (spec §4.8 "Output").
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub kept_attributes: Vec<KeptAttributeReport>,
    pub used_attribute_count: usize,
}

impl SelectionReport {
    /// Builds the report from the final selection, sorted by descending
    /// importance (the order a human would want to read it in).
    pub fn build(schema: &AttributeSchema, selection: &WeightedSelection) -> Self {
        let mut kept_attributes: Vec<KeptAttributeReport> = selection
            .iter()
            .map(|(index, weight)| {
                let attribute = schema.get(index);
                KeptAttributeReport {
                    native_name: attribute.native_name.clone(),
                    recoded_name: attribute.recoded_name.clone(),
                    weight,
                    level: attribute.level,
                    importance: (weight * attribute.level.max(0.0)).sqrt(),
                }
            })
            .collect();
        kept_attributes.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap());
        let used_attribute_count = kept_attributes.len();
        Self { kept_attributes, used_attribute_count }
    }
}

/// A conditional log-probability table flattened for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct LnPTableSpec {
    pub source_parts: usize,
    pub target_parts: usize,
    /// Row-major, `source_parts * target_parts` entries.
    pub data: Vec<f64>,
}

/// One kept attribute's contribution to the predictor (spec §4.8 "Output":
/// "for each kept attribute the conditional log-probability table and its weight").
#[derive(Debug, Clone, Serialize)]
pub struct PredictorAttributeSpec {
    pub index: AttributeIndex,
    pub recoded_name: String,
    pub weight: f64,
    pub ln_p: LnPTableSpec,
}

/// A predictor specification sufficient to score new records (spec §4.8 "Output").
#[derive(Debug, Clone, Serialize)]
pub struct PredictorSpec {
    pub attributes: Vec<PredictorAttributeSpec>,
    /// The target prior, as `ln P(target_part)` for each part of the global
    /// target partition (empty selection's per-part score).
    pub target_prior: Vec<f64>,
}

impl PredictorSpec {
    pub fn build(schema: &AttributeSchema, selection: &WeightedSelection, target_prior: Vec<f64>) -> Self {
        let mut attributes: Vec<PredictorAttributeSpec> = selection
            .iter()
            .map(|(index, weight)| {
                let attribute = schema.get(index);
                let table = attribute.ln_p_table();
                PredictorAttributeSpec {
                    index,
                    recoded_name: attribute.recoded_name.clone(),
                    weight,
                    ln_p: LnPTableSpec {
                        source_parts: table.source_parts(),
                        target_parts: table.target_parts(),
                        data: (0..table.source_parts() as u32)
                            .flat_map(|s| (0..table.target_parts() as u32).map(move |t| (s, t)))
                            .map(|(s, t)| table.ln_p(s, t))
                            .collect(),
                    },
                }
            })
            .collect();
        attributes.sort_by_key(|a| a.index);
        Self { attributes, target_prior }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::partition::{LogProbTable, TargetPartitionSpec};

    fn attr(index: u32, level: f64) -> Attribute {
        Attribute::new(
            index,
            format!("native{index}"),
            format!("recoded{index}"),
            format!("prepared{index}"),
            0,
            false,
            1.0,
            0.0,
            0.0,
            level,
            LogProbTable::new(1, 2, vec![0.5f64.ln(), 0.5f64.ln()]).unwrap(),
            TargetPartitionSpec::Singletons { symbol_count: 2 },
        )
    }

    #[test]
    fn selection_report_sorts_by_descending_importance() {
        let schema = AttributeSchema::new(vec![attr(0, 0.1), attr(1, 0.9)]);
        let mut selection = WeightedSelection::new();
        selection.increase(0, 0.5);
        selection.increase(1, 0.5);
        let report = SelectionReport::build(&schema, &selection);
        assert_eq!(report.used_attribute_count, 2);
        assert_eq!(report.kept_attributes[0].recoded_name, "recoded1");
        assert!(report.kept_attributes[0].importance > report.kept_attributes[1].importance);
    }

    #[test]
    fn predictor_spec_carries_weight_and_full_ln_p_table() {
        let schema = AttributeSchema::new(vec![attr(0, 0.5)]);
        let mut selection = WeightedSelection::new();
        selection.increase(0, 0.7);
        let spec = PredictorSpec::build(&schema, &selection, vec![0.5f64.ln(), 0.5f64.ln()]);
        assert_eq!(spec.attributes.len(), 1);
        assert_eq!(spec.attributes[0].weight, 0.7);
        assert_eq!(spec.attributes[0].ln_p.data.len(), 2);
        assert_eq!(spec.target_prior.len(), 2);
    }
}
