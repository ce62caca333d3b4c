//! Page slicing over lists that are already loaded in memory.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: usize = 25;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

/// Pages are 1-based. A page past the end yields no items but still reports
/// the real totals.
pub fn paginate<T>(items: Vec<T>, params: PageParams) -> Page<T> {
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let page = params.page.unwrap_or(1).max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page);

    let start = (page - 1).saturating_mul(per_page);
    let items = if start >= total {
        Vec::new()
    } else {
        items.into_iter().skip(start).take(per_page).collect()
    };

    Page {
        items,
        page,
        per_page,
        total,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: usize, per_page: usize) -> PageParams {
        PageParams {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    #[test]
    fn slices_middle_page() {
        let page = paginate((1..=10).collect(), params(2, 3));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 10);
        assert_eq!(page.total_pages, 4);
    }

    #[test]
    fn last_page_is_partial() {
        let page = paginate((1..=10).collect(), params(4, 3));
        assert_eq!(page.items, vec![10]);
    }

    #[test]
    fn page_past_end_is_empty_with_totals() {
        let page = paginate((1..=5).collect::<Vec<_>>(), params(9, 2));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 9);
    }

    #[test]
    fn defaults_and_clamps() {
        let page = paginate((0..300).collect::<Vec<_>>(), PageParams::default());
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(page.items.len(), DEFAULT_PER_PAGE);

        let page = paginate((0..300).collect::<Vec<_>>(), params(0, 1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PER_PAGE);

        let page = paginate((0..3).collect::<Vec<_>>(), params(1, 0));
        assert_eq!(page.per_page, 1);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn empty_list_has_zero_pages() {
        let page = paginate(Vec::<u8>::new(), PageParams::default());
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
    }
}
