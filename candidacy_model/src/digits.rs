use std::collections::BTreeMap;

use log::debug;

use crate::encode::EncodedCandidate;

/// How often candidacies with a given third ballot digit were elected.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DigitRate {
    pub year: i32,
    pub digit: u8,
    /// Candidacies with a known outcome.
    pub candidates: usize,
    pub elected: usize,
}

impl DigitRate {
    pub fn rate(&self) -> Option<f64> {
        if self.candidates == 0 {
            None
        } else {
            Some(self.elected as f64 / self.candidates as f64)
        }
    }
}

/// One entry per year and digit 0 to 9, sorted by year then digit. Rows with
/// an unknown digit or outcome are not counted.
pub fn third_digit_rates(rows: &[EncodedCandidate], years: &[i32]) -> Vec<DigitRate> {
    let mut counts: BTreeMap<(i32, u8), (usize, usize)> = BTreeMap::new();
    for &year in years.iter() {
        for digit in 0..10 {
            counts.insert((year, digit), (0, 0));
        }
    }
    for c in rows.iter() {
        if let (Some(digit), Some(elected)) = (c.third_digit, c.elected) {
            if let Some(entry) = counts.get_mut(&(c.key.election_year, digit)) {
                entry.0 += 1;
                if elected {
                    entry.1 += 1;
                }
            }
        }
    }
    let res: Vec<DigitRate> = counts
        .into_iter()
        .map(|((year, digit), (candidates, elected))| DigitRate {
            year,
            digit,
            candidates,
            elected,
        })
        .collect();
    debug!("third_digit_rates: {:?}", res);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CandidateKey;

    fn candidate(year: i32, seq: i64, digit: Option<u8>, elected: Option<bool>) -> EncodedCandidate {
        EncodedCandidate {
            key: CandidateKey::new(year, "BA", seq),
            elected,
            age: None,
            gender: None,
            education: None,
            married: None,
            national: None,
            is_local: None,
            non_majority_race: None,
            third_digit: digit,
            net_worth: None,
            contributions: None,
            expenditure: None,
        }
    }

    #[test]
    fn rates_per_year_and_digit() {
        let rows = vec![
            candidate(2010, 1, Some(1), Some(true)),
            candidate(2010, 2, Some(1), Some(false)),
            candidate(2010, 3, Some(1), Some(true)),
            candidate(2010, 4, Some(5), Some(false)),
            candidate(2010, 5, None, Some(true)),
            candidate(2010, 6, Some(5), None),
            // Not a configured year.
            candidate(2012, 7, Some(1), Some(true)),
            candidate(2014, 8, Some(0), Some(true)),
        ];
        let rates = third_digit_rates(&rows, &[2014, 2010]);
        assert_eq!(rates.len(), 20);
        assert_eq!((rates[0].year, rates[0].digit), (2010, 0));
        assert_eq!(rates[0].rate(), None);
        assert_eq!((rates[1].candidates, rates[1].elected), (3, 2));
        assert_eq!(rates[5].rate(), Some(0.0));
        assert_eq!((rates[10].year, rates[10].digit), (2014, 0));
        assert_eq!(rates[10].rate(), Some(1.0));
    }
}
