//! Intrusive singly linked list whose elements are addressed through a
//! container implementing `std::ops::Index`.
//!
//! The list never owns its elements. Each element embeds an
//! `Option<Link<Index>>` (`None` means "not in any list"), and the list header
//! remembers both ends so that FIFO use (`push_back` + `pop_front`) is O(1).
//! Removing an arbitrary element walks the list to find its predecessor.
use core::{fmt, ops};

use super::Init;

/// Linked list header.
#[derive(Copy, Clone)]
pub struct ListHead<Index> {
    pub first: Option<Index>,
    pub last: Option<Index>,
}

impl<Index> Default for ListHead<Index> {
    fn default() -> Self {
        Self::INIT
    }
}

impl<Index: fmt::Debug> fmt::Debug for ListHead<Index> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ListHead({:?}..{:?})", &self.first, &self.last)
    }
}

impl<Index> Init for ListHead<Index> {
    const INIT: Self = Self {
        first: None,
        last: None,
    };
}

impl<Index> ListHead<Index> {
    pub const fn new() -> Self {
        Self::INIT
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// Link to the following item.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link<Index> {
    pub next: Option<Index>,
}

/// A virtual container of `T`s that can be indexed by `Ident<&'static T>`.
#[derive(Debug, Clone, Copy)]
pub struct Static;

impl<T> ops::Index<Ident<&'static T>> for Static {
    type Output = T;

    fn index(&self, index: Ident<&'static T>) -> &Self::Output {
        index.0
    }
}

/// Reference wrapper that implements `PartialEq` and `Eq` by identity
/// comparison.
#[derive(Clone, Copy)]
pub struct Ident<T>(pub T);

impl<T> fmt::Debug for Ident<&'_ T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Print the address only. The pointee usually contains a link back
        // into the list.
        f.debug_tuple("Ident").field(&(self.0 as *const T)).finish()
    }
}

impl<T: ?Sized> PartialEq for Ident<&'_ T> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.0, other.0)
    }
}

impl<T: ?Sized> Eq for Ident<&'_ T> {}

/// Linked list header where elements are `&'static Element`.
pub type StaticListHead<Element> = ListHead<Ident<&'static Element>>;

/// Link to the following `&'static Element`.
pub type StaticLink<Element> = Link<Ident<&'static Element>>;

/// A cell that can be read and written given a key of type `Key`.
pub trait CellLike<Key> {
    type Target;

    fn get(&self, key: &Key) -> Self::Target;
    fn set(&self, key: &mut Key, value: Self::Target);

    #[inline]
    fn modify<T>(&self, key: &mut Key, f: impl FnOnce(&mut Self::Target) -> T) -> T
    where
        Self: Sized,
    {
        let mut x = self.get(key);
        let ret = f(&mut x);
        self.set(key, x);
        ret
    }
}

impl<Element: Copy> CellLike<()> for core::cell::Cell<Element> {
    type Target = Element;

    fn get(&self, _: &()) -> Self::Target {
        self.get()
    }
    fn set(&self, _: &mut (), value: Self::Target) {
        self.set(value);
    }
}

impl<Key, Element: CellLike<Key>> CellLike<Key> for &Element {
    type Target = Element::Target;

    fn get(&self, key: &Key) -> Self::Target {
        (*self).get(key)
    }
    fn set(&self, key: &mut Key, value: Self::Target) {
        (*self).set(key, value);
    }
}

/// An error type indicating inconsistency in a linked list structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InconsistentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The item is already a member of some list.
    AlreadyLinked,
    Inconsistent(InconsistentError),
}

impl From<InconsistentError> for InsertError {
    #[inline(always)]
    fn from(x: InconsistentError) -> Self {
        Self::Inconsistent(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemError {
    /// The item is not a member of this list.
    NotLinked,
    Inconsistent(InconsistentError),
}

impl From<InconsistentError> for ItemError {
    #[inline(always)]
    fn from(x: InconsistentError) -> Self {
        Self::Inconsistent(x)
    }
}

/// `Cell`-based accessor to a linked list.
#[derive(Debug)]
pub struct ListAccessorCell<'a, HeadCell, Pool, MapLink, CellKey> {
    head: HeadCell,
    pool: &'a Pool,
    map_link: MapLink,
    /// `Key` used to read or write cells.
    cell_key: CellKey,
}

impl<'a, HeadCell, Index, Pool, MapLink, Element, LinkCell, CellKey>
    ListAccessorCell<'a, HeadCell, Pool, MapLink, CellKey>
where
    HeadCell: CellLike<CellKey, Target = ListHead<Index>>,
    Pool: ops::Index<Index, Output = Element>,
    MapLink: Fn(&Element) -> &LinkCell,
    LinkCell: CellLike<CellKey, Target = Option<Link<Index>>>,
    Index: PartialEq + Clone,
{
    pub fn new(head: HeadCell, pool: &'a Pool, map_link: MapLink, cell_key: CellKey) -> Self {
        ListAccessorCell {
            head,
            pool,
            map_link,
            cell_key,
        }
    }

    pub fn head(&self) -> ListHead<Index> {
        self.head.get(&self.cell_key)
    }

    pub fn set_head(&mut self, head: ListHead<Index>) {
        self.head.set(&mut self.cell_key, head);
    }

    pub fn cell_key(&self) -> &CellKey {
        &self.cell_key
    }

    pub fn cell_key_mut(&mut self) -> &mut CellKey {
        &mut self.cell_key
    }

    pub fn is_empty(&self) -> bool {
        self.head().is_empty()
    }

    fn link(&self, item: &Index) -> Option<Link<Index>> {
        (self.map_link)(&self.pool[item.clone()]).get(&self.cell_key)
    }

    fn set_link(&mut self, item: &Index, link: Option<Link<Index>>) {
        (self.map_link)(&self.pool[item.clone()]).set(&mut self.cell_key, link);
    }

    /// Return `true` iff `item` is a member of some list (not necessarily
    /// this one).
    #[inline]
    pub fn is_linked(&self, item: &Index) -> bool {
        self.link(item).is_some()
    }

    #[inline]
    pub fn front(&self) -> Option<Index> {
        self.head().first
    }

    #[inline]
    pub fn back(&self) -> Option<Index> {
        self.head().last
    }

    #[inline]
    pub fn front_data(&self) -> Option<&'a Element> {
        self.front().map(|p| &self.pool[p])
    }

    /// Insert `item` right after `at` (if `at` is `Some(_)`) or to the list's
    /// front (if `at` is `None`).
    ///
    /// `at` must be a member of this list.
    pub fn insert_after(&mut self, item: Index, at: Option<Index>) -> Result<(), InsertError> {
        if self.is_linked(&item) {
            return Err(InsertError::AlreadyLinked);
        }

        let mut head = self.head();

        match at {
            None => {
                // item.next = first
                self.set_link(
                    &item,
                    Some(Link {
                        next: head.first.clone(),
                    }),
                );
                if head.last.is_none() {
                    head.last = Some(item.clone());
                }
                head.first = Some(item);
            }
            Some(at) => {
                let at_link = self.link(&at).ok_or(InconsistentError)?;

                // item.next = at.next
                // at.next = item
                self.set_link(
                    &item,
                    Some(Link {
                        next: at_link.next.clone(),
                    }),
                );
                self.set_link(
                    &at,
                    Some(Link {
                        next: Some(item.clone()),
                    }),
                );

                if at_link.next.is_none() {
                    head.last = Some(item);
                }
            }
        }

        self.set_head(head);
        Ok(())
    }

    #[inline]
    pub fn push_back(&mut self, item: Index) -> Result<(), InsertError> {
        let at = self.back();
        self.insert_after(item, at)
    }

    #[inline]
    pub fn push_front(&mut self, item: Index) -> Result<(), InsertError> {
        self.insert_after(item, None)
    }

    /// Remove the first element and return it.
    pub fn pop_front(&mut self) -> Result<Option<Index>, InconsistentError> {
        let mut head = self.head();
        let Some(first) = head.first.clone() else {
            return Ok(None);
        };

        let link = self.link(&first).ok_or(InconsistentError)?;
        head.first = link.next;
        if head.first.is_none() {
            head.last = None;
        }
        self.set_head(head);
        self.set_link(&first, None);

        Ok(Some(first))
    }

    /// Remove `item` from the list. Returns `item`.
    ///
    /// This walks the list from the front to find `item`'s predecessor.
    pub fn remove(&mut self, item: Index) -> Result<Index, ItemError> {
        let item_link = self.link(&item).ok_or(ItemError::NotLinked)?;

        // Find the predecessor
        let mut prev: Option<Index> = None;
        let mut cur = self.head().first;
        loop {
            match cur {
                // `item` is linked, but to another list
                None => return Err(ItemError::NotLinked),
                Some(c) if c == item => break,
                Some(c) => {
                    cur = self.link(&c).ok_or(InconsistentError)?.next;
                    prev = Some(c);
                }
            }
        }

        let mut head = self.head();

        match &prev {
            None => head.first = item_link.next.clone(),
            // prev.next = item.next
            Some(p) => self.set_link(
                p,
                Some(Link {
                    next: item_link.next.clone(),
                }),
            ),
        }

        if head.last.as_ref() == Some(&item) {
            head.last = prev;
        }

        self.set_head(head);
        self.set_link(&item, None);

        Ok(item)
    }

    /// Get the element following the specified element.
    #[inline]
    pub fn next(&self, i: Index) -> Result<Option<Index>, ItemError> {
        Ok(self.link(&i).ok_or(ItemError::NotLinked)?.next)
    }

    pub fn iter(&self) -> Iter<&Self, Index> {
        Iter {
            next: self.head().first,
            accessor: self,
        }
    }
}

impl<'a, HeadCell, Pool, MapLink, CellKey> ops::Deref
    for ListAccessorCell<'a, HeadCell, Pool, MapLink, CellKey>
{
    type Target = Pool;

    fn deref(&self) -> &Self::Target {
        self.pool
    }
}

/// An iterator over the elements of `ListAccessorCell`.
#[derive(Debug)]
pub struct Iter<Accessor, Index> {
    accessor: Accessor,
    next: Option<Index>,
}

impl<'a, 'b, HeadCell, Index, Pool, MapLink, Element, LinkCell, CellKey> Iterator
    for Iter<&'b ListAccessorCell<'a, HeadCell, Pool, MapLink, CellKey>, Index>
where
    HeadCell: CellLike<CellKey, Target = ListHead<Index>>,
    Pool: ops::Index<Index, Output = Element>,
    MapLink: 'a + Fn(&Element) -> &LinkCell,
    Element: 'a + 'b,
    LinkCell: CellLike<CellKey, Target = Option<Link<Index>>>,
    Index: PartialEq + Clone,
{
    type Item = Result<(Index, &'a Element), InconsistentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next.take()?;
        self.next = match self.accessor.next(next.clone()) {
            Ok(x) => x,
            Err(_) => return Some(Err(InconsistentError)),
        };
        Some(Ok((next.clone(), &self.accessor.pool[next])))
    }
}

#[cfg(test)]
fn push<Element>(this: &mut Vec<Element>, x: Element) -> usize {
    let i = this.len();
    this.push(x);
    i
}

#[test]
fn basic_cell() {
    use std::cell::Cell;
    let mut pool = Vec::new();
    let head = Cell::new(ListHead::new());

    macro_rules! get_accessor {
        () => {
            ListAccessorCell::new(&head, &pool, |(_, link)| link, ())
        };
    }

    let ptr1 = push(&mut pool, (1, Cell::new(None)));
    get_accessor!().push_back(ptr1).unwrap();

    let ptr2 = push(&mut pool, (2, Cell::new(None)));
    get_accessor!().push_back(ptr2).unwrap();

    let ptr3 = push(&mut pool, (3, Cell::new(None)));
    get_accessor!().push_front(ptr3).unwrap();

    println!("{:?}", (&pool, &head));

    let mut accessor = get_accessor!();
    assert!(!accessor.is_empty());
    assert_eq!(accessor.front(), Some(ptr3));
    assert_eq!(accessor.back(), Some(ptr2));
    assert_eq!(accessor.front_data().unwrap().0, 3);

    let items: Vec<_> = accessor
        .iter()
        .map(Result::unwrap)
        .map(|(_, (x, _))| *x)
        .collect();
    assert_eq!(items, vec![3, 1, 2]);

    assert_eq!(accessor.push_back(ptr1), Err(InsertError::AlreadyLinked));

    accessor.remove(ptr2).unwrap();
    assert_eq!(accessor.back(), Some(ptr1));
    accessor.remove(ptr3).unwrap();
    assert_eq!(accessor.front(), Some(ptr1));
    accessor.remove(ptr1).unwrap();
    println!("{:?}", (&pool, &head));

    assert!(accessor.is_empty());
    assert_eq!(accessor.back(), None);
    assert_eq!(accessor.remove(ptr1), Err(ItemError::NotLinked));
}

#[test]
fn insert_after_tail_updates_back() {
    use std::cell::Cell;
    let mut pool = Vec::new();
    let head = Cell::new(ListHead::new());

    let ptrs = [
        push(&mut pool, (1, Cell::new(None))),
        push(&mut pool, (2, Cell::new(None))),
        push(&mut pool, (3, Cell::new(None))),
    ];

    let mut accessor = ListAccessorCell::new(&head, &pool, |(_, link)| link, ());
    accessor.push_back(ptrs[0]).unwrap();
    accessor.insert_after(ptrs[2], Some(ptrs[0])).unwrap();
    accessor.insert_after(ptrs[1], Some(ptrs[0])).unwrap();

    let items: Vec<_> = accessor.iter().map(|x| x.unwrap().0).collect();
    assert_eq!(items, ptrs);
    assert_eq!(accessor.back(), Some(ptrs[2]));
    assert_eq!(accessor.next(ptrs[1]), Ok(Some(ptrs[2])));
    assert_eq!(accessor.next(ptrs[2]), Ok(None));
}

#[test]
fn clear_cell() {
    use std::cell::Cell;
    let mut pool = Vec::new();
    let head = Cell::new(ListHead::new());

    macro_rules! get_accessor {
        () => {
            ListAccessorCell::new(&head, &pool, |(_, link)| link, ())
        };
    }

    let ptrs = [
        push(&mut pool, (1, Cell::new(None))),
        push(&mut pool, (2, Cell::new(None))),
        push(&mut pool, (3, Cell::new(None))),
    ];

    get_accessor!().push_back(ptrs[0]).unwrap();
    get_accessor!().push_back(ptrs[1]).unwrap();
    get_accessor!().push_front(ptrs[2]).unwrap();

    let mut popped = Vec::new();
    while let Some(p) = get_accessor!().pop_front().unwrap() {
        popped.push(p);
    }

    assert_eq!(popped, [ptrs[2], ptrs[0], ptrs[1]]);
    assert!(head.get().first.is_none());
    assert!(head.get().last.is_none());
    for &ptr in &ptrs {
        let e = &pool[ptr];
        assert!(e.1.get().is_none());
    }
}

#[cfg(test)]
fn push_static<Element>(x: Element) -> Ident<&'static Element> {
    Ident(Box::leak(Box::new(x)))
}

#[test]
fn remove_from_foreign_list() {
    use std::cell::Cell;
    let head1 = Cell::new(ListHead::<Ident<&'static El>>::new());
    let head2 = Cell::new(ListHead::<Ident<&'static El>>::new());

    #[derive(Debug)]
    struct El(u32, Cell<Option<Link<Ident<&'static El>>>>);

    macro_rules! get_accessor {
        ($head:expr) => {
            ListAccessorCell::new($head, &Static, |El(_, link)| link, ())
        };
    }

    let ptr1 = push_static(El(1, Cell::new(None)));
    let ptr2 = push_static(El(2, Cell::new(None)));
    get_accessor!(&head1).push_back(ptr1).unwrap();
    get_accessor!(&head2).push_back(ptr2).unwrap();

    assert_eq!(
        get_accessor!(&head1).remove(ptr2),
        Err(ItemError::NotLinked)
    );
    assert_eq!(
        get_accessor!(&head2).push_back(ptr1),
        Err(InsertError::AlreadyLinked)
    );

    let mut accessor = get_accessor!(&head1);
    assert_eq!(accessor.front_data().unwrap().0, 1);
    accessor.remove(ptr1).unwrap();
    assert!(accessor.is_empty());
    assert_eq!(get_accessor!(&head2).front(), Some(ptr2));
}
