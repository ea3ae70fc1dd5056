//! Label and field selection over stored objects
use crate::{
    core::{fields::FieldSelector, labels::Selector, params::Selectors, Result},
    strategy::Attrs,
};

/// A parsed label selector plus field selector, evaluated against a strategy's [`Attrs`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionPredicate {
    /// Required labels
    pub label: Selector,
    /// Required field values
    pub field: FieldSelector,
}

impl SelectionPredicate {
    /// Parse the selectors carried by list, watch or delete-collection params
    ///
    /// The params' required fields are ANDed in as they are.
    /// Unparseable selectors are a bad request.
    pub fn from_params(params: &impl Selectors) -> Result<Self> {
        let label = match params.label_selector() {
            Some(s) => s.parse()?,
            None => Selector::default(),
        };
        let field = match params.field_selector() {
            Some(s) => s.parse::<FieldSelector>()?,
            None => FieldSelector::default(),
        };
        Ok(Self {
            label,
            field: field.and(params.required_fields().clone()),
        })
    }

    /// Whether both selectors hold for `attrs`
    pub fn matches(&self, attrs: &Attrs) -> bool {
        self.label.matches(&attrs.labels) && self.field.matches(&attrs.fields)
    }
}
