/// Selected row over the displayed symbol list, wrapping at both ends.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigationState {
    selected: Option<usize>,
    item_count: usize,
}

impl NavigationState {
    pub fn new(item_count: usize) -> Self {
        NavigationState {
            selected: if item_count > 0 { Some(0) } else { None },
            item_count,
        }
    }

    /// `None` when the list is empty.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn move_up(&mut self) {
        if let Some(i) = self.selected {
            self.selected = Some(if i == 0 { self.item_count - 1 } else { i - 1 });
        }
    }

    pub fn move_down(&mut self) {
        if let Some(i) = self.selected {
            self.selected = Some((i + 1) % self.item_count);
        }
    }

    pub fn set_item_count(&mut self, n: usize) {
        self.item_count = n;
        self.selected = match (n, self.selected) {
            (0, _) => None,
            (_, None) => Some(0),
            (n, Some(i)) => Some(i.min(n - 1)),
        };
    }
}
