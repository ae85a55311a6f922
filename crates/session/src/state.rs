//! Per-participant session state and the page-advance protocol.
//!
//! Everything here is synchronous and owns no I/O: a transition that needs a
//! log write hands the finished [`ChoiceRecord`] back to the caller.

use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use shared::{
    domain::{Assignment, Congruency, ItemId, ItemRole, PageNumber, ParticipantId, VideoItem},
    error::{ApiError, ErrorCode},
    protocol::{AdvanceOutcome, ChoiceRecord, PageSelection},
};

pub struct SessionState {
    participant_id: ParticipantId,
    pages: Vec<PageNumber>,
    page_index: usize,
    completed: bool,
    selection_by_page: HashMap<PageNumber, ItemId>,
    logged_pages: HashSet<PageNumber>,
    display_order_by_page: HashMap<PageNumber, Vec<ItemId>>,
    assignment_by_page: HashMap<PageNumber, Option<Assignment>>,
    rng: StdRng,
}

/// A page as the participant sees it: items in their fixed display order.
#[derive(Debug)]
pub struct EnteredPage<'a> {
    pub page: PageNumber,
    pub items: Vec<(&'a VideoItem, ItemRole)>,
    pub assignment: Option<Assignment>,
    pub selection: Option<ItemId>,
}

#[derive(Debug)]
pub struct Transition {
    pub outcome: AdvanceOutcome,
    /// Set when this call is the first successful advance for the page.
    pub record: Option<ChoiceRecord>,
}

impl SessionState {
    /// Fails with [`ErrorCode::NoPages`] when there is nothing to walk through.
    pub fn new(
        participant_id: ParticipantId,
        pages: Vec<PageNumber>,
        rng: StdRng,
    ) -> Result<Self, ApiError> {
        if pages.is_empty() {
            return Err(ApiError::new(
                ErrorCode::NoPages,
                "no video pages are available; please contact the experimenter",
            ));
        }
        Ok(Self {
            participant_id,
            pages,
            page_index: 0,
            completed: false,
            selection_by_page: HashMap::new(),
            logged_pages: HashSet::new(),
            display_order_by_page: HashMap::new(),
            assignment_by_page: HashMap::new(),
            rng,
        })
    }

    pub fn with_seed(
        participant_id: ParticipantId,
        pages: Vec<PageNumber>,
        seed: u64,
    ) -> Result<Self, ApiError> {
        Self::new(participant_id, pages, StdRng::seed_from_u64(seed))
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn pages(&self) -> &[PageNumber] {
        &self.pages
    }

    pub fn current_page(&self) -> PageNumber {
        self.pages[self.page_index]
    }

    pub fn last_page(&self) -> PageNumber {
        self.pages[self.pages.len() - 1]
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn selection(&self, page: PageNumber) -> Option<&ItemId> {
        self.selection_by_page.get(&page)
    }

    pub fn is_logged(&self, page: PageNumber) -> bool {
        self.logged_pages.contains(&page)
    }

    pub fn display_order(&self, page: PageNumber) -> Option<&[ItemId]> {
        self.display_order_by_page.get(&page).map(Vec::as_slice)
    }

    pub fn assignment(&self, page: PageNumber) -> Option<&Assignment> {
        self.assignment_by_page.get(&page).and_then(Option::as_ref)
    }

    pub fn selections(&self) -> Vec<PageSelection> {
        let mut selections: Vec<PageSelection> = self
            .selection_by_page
            .iter()
            .map(|(page, item_id)| PageSelection {
                page: *page,
                item_id: item_id.clone(),
            })
            .collect();
        selections.sort_by_key(|s| s.page);
        selections
    }

    pub fn logged_pages(&self) -> Vec<PageNumber> {
        let mut pages: Vec<PageNumber> = self.logged_pages.iter().copied().collect();
        pages.sort();
        pages
    }

    /// Draws display order and assignment for `page` on first visit; later calls reuse them.
    pub fn enter_page<'a>(&mut self, page: PageNumber, items: &'a [VideoItem]) -> EnteredPage<'a> {
        self.ensure_randomized(page, items);

        let assignment = self.assignment(page).cloned();
        let order = self
            .display_order_by_page
            .get(&page)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let items = order
            .iter()
            .filter_map(|id| items.iter().find(|item| &item.id == id))
            .map(|item| {
                let role = assignment
                    .as_ref()
                    .map_or(ItemRole::None, |a| a.role_of(&item.id));
                (item, role)
            })
            .collect();

        EnteredPage {
            page,
            items,
            assignment,
            selection: self.selection(page).cloned(),
        }
    }

    /// Records a choice for the current page. Returns false, changing nothing, when the
    /// item is not on the page, the page is not current, or the session is finished.
    pub fn select_item(&mut self, page: PageNumber, item_id: &ItemId, items: &[VideoItem]) -> bool {
        if self.completed || page != self.current_page() {
            return false;
        }
        if !items.iter().any(|item| &item.id == item_id) {
            return false;
        }
        self.selection_by_page.insert(page, item_id.clone());
        true
    }

    pub fn advance(
        &mut self,
        page: PageNumber,
        items: &[VideoItem],
        timestamp: &str,
    ) -> Result<Transition, ApiError> {
        let position = self
            .pages
            .iter()
            .position(|p| *p == page)
            .ok_or_else(|| {
                ApiError::new(ErrorCode::Validation, format!("page {page} is not part of this survey"))
            })?;

        if self.completed {
            let outcome = if position == self.pages.len() - 1 {
                AdvanceOutcome::Completed { logged: false }
            } else {
                AdvanceOutcome::AlreadyAdvanced {
                    current_page: self.last_page(),
                }
            };
            return Ok(Transition {
                outcome,
                record: None,
            });
        }

        if position < self.page_index {
            return Ok(Transition {
                outcome: AdvanceOutcome::AlreadyAdvanced {
                    current_page: self.current_page(),
                },
                record: None,
            });
        }
        if position > self.page_index {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("page {page} has not been reached yet"),
            ));
        }

        let selected = self.selection_by_page.get(&page).ok_or_else(|| {
            ApiError::new(
                ErrorCode::NoSelection,
                "please select a video before continuing",
            )
        })?;
        let chosen = items.iter().find(|item| &item.id == selected).ok_or_else(|| {
            ApiError::new(
                ErrorCode::Internal,
                "selected video not found on this page (internal error)",
            )
        })?;

        self.ensure_randomized(page, items);

        let record = if self.logged_pages.insert(page) {
            Some(self.build_record(page, chosen, items, timestamp))
        } else {
            None
        };
        let logged = record.is_some();

        let outcome = if self.page_index + 1 < self.pages.len() {
            self.page_index += 1;
            AdvanceOutcome::Advanced {
                logged,
                next_page: self.current_page(),
            }
        } else {
            self.completed = true;
            AdvanceOutcome::Completed { logged }
        };

        Ok(Transition { outcome, record })
    }

    fn ensure_randomized(&mut self, page: PageNumber, items: &[VideoItem]) {
        if !self.display_order_by_page.contains_key(&page) {
            let mut order: Vec<ItemId> = items.iter().map(|item| item.id.clone()).collect();
            order.shuffle(&mut self.rng);
            self.display_order_by_page.insert(page, order);
        }
        if !self.assignment_by_page.contains_key(&page) {
            let assignment = draw_assignment(&mut self.rng, items);
            self.assignment_by_page.insert(page, assignment);
        }
    }

    fn build_record(
        &self,
        page: PageNumber,
        chosen: &VideoItem,
        items: &[VideoItem],
        timestamp: &str,
    ) -> ChoiceRecord {
        let assignment = self.assignment(page);
        let vid_of = |id: &ItemId| {
            items
                .iter()
                .find(|item| &item.id == id)
                .map(|item| item.vid_id.clone())
        };

        ChoiceRecord {
            timestamp_et: timestamp.to_string(),
            participant_id: self.participant_id.clone(),
            page,
            chosen_internal_id: chosen.id.clone(),
            chosen_title: chosen.title.clone(),
            chosen_vid_id: chosen.vid_id.clone(),
            control_internal_id: assignment.map(|a| a.control.clone()),
            control_vid_id: assignment.and_then(|a| vid_of(&a.control)),
            treated_internal_id: assignment.map(|a| a.treated.clone()),
            treated_vid_id: assignment.and_then(|a| vid_of(&a.treated)),
            treated_image_congruency: assignment.map(|a| a.image_congruency),
            treated_text_congruency: assignment.map(|a| a.text_congruency),
        }
    }
}

/// Control is drawn uniformly; treated is the first other item in catalog order.
fn draw_assignment(rng: &mut StdRng, items: &[VideoItem]) -> Option<Assignment> {
    if items.len() < 2 {
        return None;
    }
    let control_index = rng.random_range(0..items.len());
    let treated = items
        .iter()
        .enumerate()
        .find(|(index, _)| *index != control_index)
        .map(|(_, item)| item.id.clone())?;

    Some(Assignment {
        control: items[control_index].id.clone(),
        treated,
        image_congruency: draw_congruency(rng),
        text_congruency: draw_congruency(rng),
    })
}

fn draw_congruency(rng: &mut StdRng) -> Congruency {
    if rng.random_bool(0.5) {
        Congruency::More
    } else {
        Congruency::Less
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
