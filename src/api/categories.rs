//! Well-known arXiv subject categories.
//!
//! The API offers no listing endpoint, so this is a fixed table of the
//! categories most searches use. Any other code is still accepted in queries.

/// `(code, description)` pairs, sorted by code.
pub const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("cs.AI", "Artificial Intelligence"),
    ("cs.CL", "Computation and Language"),
    ("cs.CR", "Cryptography and Security"),
    ("cs.CV", "Computer Vision and Pattern Recognition"),
    ("cs.DB", "Databases"),
    ("cs.DS", "Data Structures and Algorithms"),
    ("cs.HC", "Human-Computer Interaction"),
    ("cs.IR", "Information Retrieval"),
    ("cs.IT", "Information Theory"),
    ("cs.LG", "Machine Learning"),
    ("cs.NE", "Neural and Evolutionary Computing"),
    ("cs.RO", "Robotics"),
    ("cs.SE", "Software Engineering"),
    ("cs.SY", "Systems and Control"),
    ("econ.EM", "Econometrics"),
    ("econ.TH", "Theoretical Economics"),
    ("math.CO", "Combinatorics"),
    ("math.IT", "Information Theory"),
    ("math.OC", "Optimization and Control"),
    ("math.PR", "Probability"),
    ("math.ST", "Statistics Theory"),
    ("physics.comp-ph", "Computational Physics"),
    ("physics.data-an", "Data Analysis, Statistics and Probability"),
    ("q-bio.BM", "Biomolecules"),
    ("q-bio.GN", "Genomics"),
    ("q-bio.QM", "Quantitative Methods"),
    ("q-fin.CP", "Computational Finance"),
    ("q-fin.RM", "Risk Management"),
    ("q-fin.ST", "Statistical Finance"),
    ("stat.AP", "Applications"),
    ("stat.CO", "Computation"),
    ("stat.ML", "Machine Learning"),
    ("stat.TH", "Theory"),
];

/// Description of a known category code, matched case-sensitively.
#[must_use]
pub fn describe_category(code: &str) -> Option<&'static str> {
    KNOWN_CATEGORIES
        .binary_search_by(|(known, _)| known.cmp(&code))
        .ok()
        .map(|index| KNOWN_CATEGORIES[index].1)
}
