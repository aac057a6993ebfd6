//! Picks which groups survive and which submission represents each group.
//!
//! Candidates are shuffled before a stable sort on weight, so equally
//! weighted submissions take turns being shown and new ones get a chance to
//! collect votes.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::grouping::OverlappingSegmentGroup;
use crate::models::{ActionType, Category, DbSegment, HiddenType};

pub trait Votable {
    fn votes(&self) -> i32;
    fn reputation(&self) -> f64;
    fn locked(&self) -> bool;

    fn weight(&self) -> f64 {
        self.votes() as f64 + self.reputation()
    }
}

impl Votable for DbSegment {
    fn votes(&self) -> i32 {
        self.votes
    }

    fn reputation(&self) -> f64 {
        self.reputation
    }

    fn locked(&self) -> bool {
        self.locked
    }
}

impl Votable for OverlappingSegmentGroup {
    fn votes(&self) -> i32 {
        self.votes
    }

    fn reputation(&self) -> f64 {
        self.reputation
    }

    fn locked(&self) -> bool {
        self.locked
    }
}

/// Returns at most `amount` of the best weighted `choices`.
///
/// With a `predicate`, only matching choices compete; the others are passed
/// through untouched ahead of the winners. `filter_locked` then narrows the
/// competing choices to locked ones whenever any of them is locked.
pub fn best_choice<T, R>(
    choices: Vec<T>,
    amount: usize,
    filter_locked: bool,
    predicate: Option<&dyn Fn(&T) -> bool>,
    rng: &mut R,
) -> Vec<T>
where
    T: Votable,
    R: Rng + ?Sized,
{
    if amount >= choices.len() {
        return choices;
    }

    let (mut candidates, mut force_included): (Vec<T>, Vec<T>) = match predicate {
        Some(predicate) => {
            let (mut matching, rest): (Vec<T>, Vec<T>) = choices.into_iter().partition(|choice| predicate(choice));
            if filter_locked && matching.iter().any(|choice| choice.locked()) {
                matching.retain(|choice| choice.locked());
            }
            (matching, rest)
        }
        None => (choices, Vec::new()),
    };

    if amount >= candidates.len() {
        force_included.append(&mut candidates);
        return force_included;
    }

    candidates.shuffle(rng);
    candidates.sort_by(|a, b| b.weight().total_cmp(&a.weight()));
    candidates.truncate(amount);

    force_included.append(&mut candidates);
    force_included
}

fn first_action_is(group: &OverlappingSegmentGroup, action_type: ActionType) -> bool {
    group
        .segments
        .first()
        .is_some_and(|segment| segment.action_type == action_type)
}

/// At most one full-video group and one point-of-interest group survive,
/// locked ones preferred; then one submission is drawn from every group.
pub fn choose_segments<R: Rng + ?Sized>(groups: Vec<OverlappingSegmentGroup>, rng: &mut R) -> Vec<DbSegment> {
    let is_full = |group: &OverlappingSegmentGroup| first_action_is(group, ActionType::Full);
    let is_poi = |group: &OverlappingSegmentGroup| first_action_is(group, ActionType::Poi);

    let chosen_groups = best_choice(groups, 1, true, Some(&is_full), rng);
    let chosen_groups = best_choice(chosen_groups, 1, true, Some(&is_poi), rng);

    chosen_groups
        .into_iter()
        .filter_map(|group| best_choice(group.segments, 1, false, None, rng).into_iter().next())
        .collect()
}

/// Full-video label categories, most important first.
const LABEL_PRECEDENCE: [Category; 3] = [Category::Sponsor, Category::ExclusiveAccess, Category::Selfpromo];

/// The single full-video label of a video. Only visible, not heavily
/// downvoted Full segments qualify, locked ones win outright, and ties are
/// broken by category rather than by votes.
pub fn choose_label(segments: Vec<DbSegment>) -> Option<DbSegment> {
    let mut candidates: Vec<DbSegment> = segments
        .into_iter()
        .filter(|segment| {
            segment.action_type == ActionType::Full && segment.votes > -2 && segment.hidden == HiddenType::Show
        })
        .collect();

    if candidates.iter().any(|segment| segment.locked) {
        candidates.retain(|segment| segment.locked);
    }
    if candidates.len() <= 1 {
        return candidates.pop();
    }

    LABEL_PRECEDENCE
        .iter()
        .find_map(|category| candidates.iter().position(|segment| segment.category == *category))
        .map(|index| candidates.swap_remove(index))
}
