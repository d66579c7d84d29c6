//! Quorum arithmetic

use flagbot_common::categories::{Category, VoteVector};

/// One reviewer's cast votes and whether that reviewer is trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub votes: VoteVector,
    pub trusted: bool,
}

impl CastVote {
    pub fn new(votes: VoteVector, trusted: bool) -> Self {
        Self { votes, trusted }
    }

    fn weight(&self) -> u64 {
        if self.trusted {
            2
        } else {
            1
        }
    }
}

/// Decide an item from its cast votes
///
/// Returns `None` below quorum. Otherwise each category is 1 iff the weighted
/// yes votes are at least 2/3 of the weighted cast votes; a trusted
/// reviewer's vote is counted twice. Missing categories count as 0.
pub fn decide(cast: &[CastVote], min_votes: u32) -> Option<VoteVector> {
    if cast.len() < min_votes as usize || cast.is_empty() {
        return None;
    }

    let total: u64 = cast.iter().map(CastVote::weight).sum();

    let outcome = Category::ALL
        .iter()
        .map(|category| {
            let yes: u64 = cast
                .iter()
                .filter(|c| c.votes.get(category).copied().unwrap_or(0) > 0)
                .map(CastVote::weight)
                .sum();
            // yes / total >= 2/3 without floating point
            (*category, i64::from(3 * yes >= 2 * total))
        })
        .collect();

    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insult(vote: i64, trusted: bool) -> CastVote {
        let mut votes = VoteVector::new();
        votes.insert(Category::Insult, vote);
        CastVote::new(votes, trusted)
    }

    #[test]
    fn test_two_of_three_is_a_yes() {
        let cast = [insult(1, false), insult(1, false), insult(0, false)];
        let outcome = decide(&cast, 3).unwrap();
        assert_eq!(outcome[&Category::Insult], 1);
        assert_eq!(outcome[&Category::Threat], 0);
    }

    #[test]
    fn test_one_of_three_is_a_no() {
        let cast = [insult(1, false), insult(0, false), insult(0, false)];
        assert_eq!(decide(&cast, 3).unwrap()[&Category::Insult], 0);
    }

    #[test]
    fn test_below_quorum_undecided() {
        let cast = [insult(1, false), insult(1, false)];
        assert!(decide(&cast, 3).is_none());
        assert!(decide(&[], 0).is_none());
    }

    #[test]
    fn test_trusted_vote_counts_twice() {
        // Weighted 2 yes of 4 total: below 2/3
        let cast = [insult(1, true), insult(0, false), insult(0, false)];
        assert_eq!(decide(&cast, 3).unwrap()[&Category::Insult], 0);

        // Weighted 3 yes of 4 total: above 2/3
        let cast = [insult(1, true), insult(1, false), insult(0, false)];
        assert_eq!(decide(&cast, 3).unwrap()[&Category::Insult], 1);

        // Untrusted majority of 2 against a trusted no: 2 of 4
        let cast = [insult(0, true), insult(1, false), insult(1, false)];
        assert_eq!(decide(&cast, 3).unwrap()[&Category::Insult], 0);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let cast = [insult(1, false), insult(0, true), insult(1, false), insult(1, false)];
        assert_eq!(decide(&cast, 3), decide(&cast, 3));
    }
}
