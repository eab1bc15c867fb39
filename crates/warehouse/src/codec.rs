//! Bin address rendering.
//!
//! Maps a `(aisle, shelf, position index)` coordinate to a position label and a
//! full address such as `WH1-A-01-03-B`. Pure and deterministic: the same codec
//! and coordinate always render the same address.

use serde::{Deserialize, Serialize};

use slotforge_core::{DomainError, DomainResult};

use crate::structure::{BinDirection, BinLabeling, CodePattern};

/// Canonical form used for address comparison: trimmed, ASCII uppercase.
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Spreadsheet-column label for a 0-based index: 0 → "A", 25 → "Z", 26 → "AA".
pub fn letters_label(index: u32) -> String {
    // Bijective base-26: no digit stands for zero.
    let mut n = u64::from(index) + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

/// 1-based decimal label, padded to the width of the shelf's bin count (at least 2).
pub fn numbers_label(index: u32, bins_on_shelf: u32) -> String {
    let width = digit_count(bins_on_shelf).max(2);
    pad(u64::from(index) + 1, width)
}

/// Zero-pads `n` to `width`; wider numbers keep all their digits.
fn pad(n: u64, width: usize) -> String {
    format!("{n:0width$}")
}

fn digit_count(n: u32) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// Label of `position_index` on a shelf holding `bins_on_shelf` bins.
///
/// `TopDown` reverses the label sequence of this shelf only: index `i` gets the
/// label `BottomUp` would give index `bins_on_shelf - 1 - i`.
///
/// Callers guarantee `position_index < bins_on_shelf`.
fn label_for(pattern: &CodePattern, position_index: u32, bins_on_shelf: u32) -> String {
    let ordinal = match pattern.bin_direction {
        BinDirection::BottomUp => position_index,
        BinDirection::TopDown => bins_on_shelf.saturating_sub(1).saturating_sub(position_index),
    };
    match pattern.bin_labeling {
        BinLabeling::Letters => letters_label(ordinal),
        BinLabeling::Numbers => numbers_label(ordinal, bins_on_shelf),
    }
}

/// Rendered position label and full address of one bin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBin {
    pub position_label: String,
    pub address: String,
}

/// Address renderer bound to one zone (its warehouse/zone codes) and a code pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCodec {
    warehouse_code: String,
    zone_code: String,
    pattern: CodePattern,
}

impl AddressCodec {
    pub fn new(
        warehouse_code: impl AsRef<str>,
        zone_code: impl AsRef<str>,
        pattern: CodePattern,
    ) -> Self {
        Self {
            warehouse_code: normalize_address(warehouse_code.as_ref()),
            zone_code: normalize_address(zone_code.as_ref()),
            pattern,
        }
    }

    pub fn pattern(&self) -> &CodePattern {
        &self.pattern
    }

    /// Render the bin at `position_index` (0-based) on `shelf` of `aisle`.
    pub fn encode(
        &self,
        aisle: u32,
        shelf: u32,
        position_index: u32,
        bins_on_shelf: u32,
    ) -> DomainResult<EncodedBin> {
        if aisle == 0 || shelf == 0 {
            return Err(DomainError::invariant(format!(
                "aisle and shelf numbers are 1-based (got aisle {aisle}, shelf {shelf})"
            )));
        }
        if position_index >= bins_on_shelf {
            return Err(DomainError::invariant(format!(
                "position index {position_index} is outside a shelf of {bins_on_shelf} bins"
            )));
        }
        Ok(self.render(aisle, shelf, position_index, bins_on_shelf))
    }

    pub(crate) fn render(
        &self,
        aisle: u32,
        shelf: u32,
        position_index: u32,
        bins_on_shelf: u32,
    ) -> EncodedBin {
        let position_label = label_for(&self.pattern, position_index, bins_on_shelf);
        let sep = self.pattern.separator.as_str();
        let aisle = pad(aisle.into(), self.pattern.aisle_digits as usize);
        let shelf = pad(shelf.into(), self.pattern.shelf_digits as usize);
        let address = [
            self.warehouse_code.as_str(),
            self.zone_code.as_str(),
            aisle.as_str(),
            shelf.as_str(),
            position_label.as_str(),
        ]
        .join(sep);
        EncodedBin {
            position_label,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(pattern: CodePattern) -> AddressCodec {
        AddressCodec::new("wh1", "a", pattern)
    }

    #[test]
    fn letters_follow_spreadsheet_columns() {
        assert_eq!(letters_label(0), "A");
        assert_eq!(letters_label(25), "Z");
        assert_eq!(letters_label(26), "AA");
        assert_eq!(letters_label(27), "AB");
        assert_eq!(letters_label(51), "AZ");
        assert_eq!(letters_label(52), "BA");
        assert_eq!(letters_label(701), "ZZ");
        assert_eq!(letters_label(702), "AAA");
    }

    #[test]
    fn numbers_are_one_based_and_padded() {
        assert_eq!(numbers_label(0, 5), "01");
        assert_eq!(numbers_label(4, 5), "05");
        assert_eq!(numbers_label(99, 120), "100");
        assert_eq!(numbers_label(0, 120), "001");
    }

    #[test]
    fn address_joins_components_in_contract_order() {
        let c = codec(CodePattern::default());
        let encoded = c.encode(1, 3, 1, 4).unwrap();
        assert_eq!(encoded.position_label, "B");
        assert_eq!(encoded.address, "WH1-A-01-03-B");
    }

    #[test]
    fn digit_fields_widen_instead_of_truncating() {
        let c = codec(CodePattern::default().with_digits(1, 2));
        assert_eq!(c.encode(12, 345, 0, 1).unwrap().address, "WH1-A-12-345-A");
    }

    #[test]
    fn custom_separator_and_widths() {
        let c = codec(
            CodePattern::default()
                .with_separator(".")
                .with_digits(3, 1)
                .with_labeling(BinLabeling::Numbers),
        );
        assert_eq!(c.encode(7, 2, 9, 10).unwrap().address, "WH1.A.007.2.10");
    }

    #[test]
    fn top_down_reverses_within_the_shelf() {
        let c = codec(CodePattern::default().with_direction(BinDirection::TopDown));
        assert_eq!(c.encode(1, 1, 0, 3).unwrap().position_label, "C");
        assert_eq!(c.encode(1, 1, 2, 3).unwrap().position_label, "A");
        // A shelf with a different bin count gets its own reversal.
        assert_eq!(c.encode(2, 1, 0, 5).unwrap().position_label, "E");
    }

    #[test]
    fn top_down_numbers_keep_the_shelf_width() {
        let c = codec(
            CodePattern::default()
                .with_labeling(BinLabeling::Numbers)
                .with_direction(BinDirection::TopDown),
        );
        assert_eq!(c.encode(1, 1, 0, 12).unwrap().position_label, "12");
        assert_eq!(c.encode(1, 1, 11, 12).unwrap().position_label, "01");
    }

    #[test]
    fn rejects_coordinates_outside_the_shelf() {
        let c = codec(CodePattern::default());
        assert!(c.encode(1, 1, 4, 4).is_err());
        assert!(c.encode(0, 1, 0, 4).is_err());
        assert!(c.encode(1, 0, 0, 4).is_err());
    }

    #[test]
    fn normalizes_codes_and_addresses() {
        assert_eq!(normalize_address("  wh1-a-01-01-b "), "WH1-A-01-01-B");
        let c = AddressCodec::new(" main ", "cold", CodePattern::default());
        assert!(c.encode(1, 1, 0, 1).unwrap().address.starts_with("MAIN-COLD-"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn labeling() -> impl Strategy<Value = BinLabeling> {
            prop_oneof![Just(BinLabeling::Letters), Just(BinLabeling::Numbers)]
        }

        proptest! {
            /// Property: TOP_DOWN label at i equals BOTTOM_UP label at n-1-i.
            #[test]
            fn direction_law(n in 1u32..200, seed in any::<u32>(), labeling in labeling()) {
                let i = seed % n;
                let up = codec(CodePattern::default().with_labeling(labeling));
                let down = codec(
                    CodePattern::default()
                        .with_labeling(labeling)
                        .with_direction(BinDirection::TopDown),
                );
                let top_down = down.encode(1, 1, i, n).unwrap();
                let bottom_up = up.encode(1, 1, n - 1 - i, n).unwrap();
                prop_assert_eq!(top_down, bottom_up);
            }

            /// Property: encoding is deterministic.
            #[test]
            fn encode_is_deterministic(
                aisle in 1u32..1000,
                shelf in 1u32..1000,
                n in 1u32..100,
                seed in any::<u32>(),
            ) {
                let c = codec(CodePattern::default());
                let i = seed % n;
                prop_assert_eq!(c.encode(aisle, shelf, i, n).unwrap(), c.encode(aisle, shelf, i, n).unwrap());
            }

            /// Property: distinct indices get distinct letter labels.
            #[test]
            fn letters_are_injective(a in 0u32..100_000, b in 0u32..100_000) {
                prop_assume!(a != b);
                prop_assert_ne!(letters_label(a), letters_label(b));
            }
        }
    }
}
