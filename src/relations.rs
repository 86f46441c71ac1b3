//! Pointer symbol to relation type mapping.
//!
//! WNDB data lines encode cross references as `symbol offset pos source/target`
//! quadruples. Only the symbol carries the meaning of the edge; this module is
//! the single table translating it into the label persisted in
//! `relations.relation_type`.

use std::fmt;
use std::str::FromStr;

/// Canonical relation types, one per WNDB pointer symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationType {
    Antonym,
    Hypernym,
    InstanceHypernym,
    Hyponym,
    InstanceHyponym,
    MemberHolonym,
    SubstanceHolonym,
    PartHolonym,
    MemberMeronym,
    SubstanceMeronym,
    PartMeronym,
    Attribute,
    DerivationallyRelatedForm,
    DomainTopic,
    MemberOfDomainTopic,
    DomainRegion,
    MemberOfDomainRegion,
    DomainUsage,
    MemberOfDomainUsage,
    Entailment,
    Cause,
    AlsoSee,
    VerbGroup,
    SimilarTo,
    ParticipleOfVerb,
    Pertainym,
}

impl RelationType {
    pub const ALL: [RelationType; 26] = [
        RelationType::Antonym,
        RelationType::Hypernym,
        RelationType::InstanceHypernym,
        RelationType::Hyponym,
        RelationType::InstanceHyponym,
        RelationType::MemberHolonym,
        RelationType::SubstanceHolonym,
        RelationType::PartHolonym,
        RelationType::MemberMeronym,
        RelationType::SubstanceMeronym,
        RelationType::PartMeronym,
        RelationType::Attribute,
        RelationType::DerivationallyRelatedForm,
        RelationType::DomainTopic,
        RelationType::MemberOfDomainTopic,
        RelationType::DomainRegion,
        RelationType::MemberOfDomainRegion,
        RelationType::DomainUsage,
        RelationType::MemberOfDomainUsage,
        RelationType::Entailment,
        RelationType::Cause,
        RelationType::AlsoSee,
        RelationType::VerbGroup,
        RelationType::SimilarTo,
        RelationType::ParticipleOfVerb,
        RelationType::Pertainym,
    ];

    /// Looks up a pointer symbol exactly as it appears in a data line.
    ///
    /// Multi-character symbols (`@i`, `#m`, `;c`, ...) are distinct keys and
    /// never fall back to their first character. Unknown symbols yield `None`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let rel = match symbol {
            "!" => RelationType::Antonym,
            "@" => RelationType::Hypernym,
            "@i" => RelationType::InstanceHypernym,
            "~" => RelationType::Hyponym,
            "~i" => RelationType::InstanceHyponym,
            "#m" => RelationType::MemberHolonym,
            "#s" => RelationType::SubstanceHolonym,
            "#p" => RelationType::PartHolonym,
            "%m" => RelationType::MemberMeronym,
            "%s" => RelationType::SubstanceMeronym,
            "%p" => RelationType::PartMeronym,
            "=" => RelationType::Attribute,
            "+" => RelationType::DerivationallyRelatedForm,
            ";c" => RelationType::DomainTopic,
            "-c" => RelationType::MemberOfDomainTopic,
            ";r" => RelationType::DomainRegion,
            "-r" => RelationType::MemberOfDomainRegion,
            ";u" => RelationType::DomainUsage,
            "-u" => RelationType::MemberOfDomainUsage,
            "*" => RelationType::Entailment,
            ">" => RelationType::Cause,
            "^" => RelationType::AlsoSee,
            "$" => RelationType::VerbGroup,
            "&" => RelationType::SimilarTo,
            "<" => RelationType::ParticipleOfVerb,
            "\\" => RelationType::Pertainym,
            _ => return None,
        };
        Some(rel)
    }

    /// The pointer symbol this relation is read from.
    pub fn symbol(self) -> &'static str {
        match self {
            RelationType::Antonym => "!",
            RelationType::Hypernym => "@",
            RelationType::InstanceHypernym => "@i",
            RelationType::Hyponym => "~",
            RelationType::InstanceHyponym => "~i",
            RelationType::MemberHolonym => "#m",
            RelationType::SubstanceHolonym => "#s",
            RelationType::PartHolonym => "#p",
            RelationType::MemberMeronym => "%m",
            RelationType::SubstanceMeronym => "%s",
            RelationType::PartMeronym => "%p",
            RelationType::Attribute => "=",
            RelationType::DerivationallyRelatedForm => "+",
            RelationType::DomainTopic => ";c",
            RelationType::MemberOfDomainTopic => "-c",
            RelationType::DomainRegion => ";r",
            RelationType::MemberOfDomainRegion => "-r",
            RelationType::DomainUsage => ";u",
            RelationType::MemberOfDomainUsage => "-u",
            RelationType::Entailment => "*",
            RelationType::Cause => ">",
            RelationType::AlsoSee => "^",
            RelationType::VerbGroup => "$",
            RelationType::SimilarTo => "&",
            RelationType::ParticipleOfVerb => "<",
            RelationType::Pertainym => "\\",
        }
    }

    /// The label stored in `relations.relation_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Antonym => "Antonym",
            RelationType::Hypernym => "Hypernym",
            RelationType::InstanceHypernym => "Instance Hypernym",
            RelationType::Hyponym => "Hyponym",
            RelationType::InstanceHyponym => "Instance Hyponym",
            RelationType::MemberHolonym => "Holonym (member)",
            RelationType::SubstanceHolonym => "Holonym (substance)",
            RelationType::PartHolonym => "Holonym (part)",
            RelationType::MemberMeronym => "Meronym (member)",
            RelationType::SubstanceMeronym => "Meronym (substance)",
            RelationType::PartMeronym => "Meronym (part)",
            RelationType::Attribute => "Attribute",
            RelationType::DerivationallyRelatedForm => "Derivationally Related Form",
            RelationType::DomainTopic => "Domain of synset - TOPIC",
            RelationType::MemberOfDomainTopic => "Member of this domain - TOPIC",
            RelationType::DomainRegion => "Domain of synset - REGION",
            RelationType::MemberOfDomainRegion => "Member of this domain - REGION",
            RelationType::DomainUsage => "Domain of synset - USAGE",
            RelationType::MemberOfDomainUsage => "Member of this domain - USAGE",
            RelationType::Entailment => "Entailment",
            RelationType::Cause => "Cause",
            RelationType::AlsoSee => "Also See",
            RelationType::VerbGroup => "Verb Group",
            RelationType::SimilarTo => "Similar To",
            RelationType::ParticipleOfVerb => "Participle of Verb",
            RelationType::Pertainym => "Pertainym (derived from noun)",
        }
    }

    /// Parses a label previously produced by [`RelationType::as_str`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rel| rel.as_str() == label)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Accepts either a stored label or a raw pointer symbol.
impl FromStr for RelationType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
            .or_else(|| Self::from_symbol(s))
            .ok_or_else(|| format!("Unknown relation type: {}", s))
    }
}
