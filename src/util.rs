use std::time;

use tui::widgets;

/// List with wrap-around selection, backing a stateful tui `List` widget.
pub struct WrappingList<T> {
    data: Vec<T>,
    state: widgets::ListState,
}

impl<T> WrappingList<T> {
    pub fn new(data: Vec<T>) -> Self {
        let mut l = Self {
            data,
            state: widgets::ListState::default(),
        };

        if !l.data.is_empty() {
            l.state.select(Some(0));
        }

        l
    }

    /// Swaps in new content, resetting the selection to the top.
    pub fn replace(&mut self, data: Vec<T>) {
        *self = Self::new(data);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn state(&mut self) -> &mut widgets::ListState {
        &mut self.state
    }

    pub fn selected(&self) -> Option<&T> {
        Some(&self.data[self.state.selected()?])
    }

    pub fn selected_mut(&mut self) -> Option<&mut T> {
        Some(&mut self.data[self.state.selected()?])
    }

    pub fn down(&mut self) {
        if self.data.is_empty() {
            return;
        }

        let next = (self.state.selected().unwrap_or_default() + 1) % self.data.len();
        self.state.select(Some(next));
    }

    pub fn up(&mut self) {
        if self.data.is_empty() {
            return;
        }

        let next =
            (self.state.selected().unwrap_or_default() + self.data.len() - 1) % self.data.len();
        self.state.select(Some(next));
    }
}

/// Braille spinner shown while a fetch is in flight.
pub struct DotsSpinner {
    state: usize,
    last_tick: Option<time::Instant>,
}

impl DotsSpinner {
    pub const PATTERN: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

    const FRAME: time::Duration = time::Duration::from_millis(80);

    pub fn new() -> Self {
        Self {
            state: 0,
            last_tick: None,
        }
    }

    pub fn tick(&mut self) {
        let now = time::Instant::now();

        match self.last_tick {
            None => self.last_tick = Some(now),
            Some(t) => {
                if now - t >= Self::FRAME {
                    self.last_tick = Some(now);
                    self.state = (self.state + 1) % Self::PATTERN.len();
                }
            }
        }
    }

    pub fn pattern(&self) -> char {
        Self::PATTERN[self.state]
    }
}

impl Default for DotsSpinner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_wraps_both_ways() {
        let mut list = WrappingList::new(vec!['a', 'b', 'c']);
        assert_eq!(list.selected(), Some(&'a'));

        list.up();
        assert_eq!(list.selected(), Some(&'c'));
        list.down();
        assert_eq!(list.selected(), Some(&'a'));
    }

    #[test]
    fn empty_list_has_no_selection() {
        let mut list: WrappingList<u8> = WrappingList::new(vec![]);
        list.down();
        assert_eq!(list.selected(), None);

        list.replace(vec![1]);
        assert_eq!(list.selected(), Some(&1));
    }
}
