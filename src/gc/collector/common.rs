//! Free operations shared by every bitmap-marking collector variant (STW, generational,
//! G1), so each variant's own file only holds what's actually different about its plan.
//!
//! Shared pieces (marking, reference processing) expressed as free operations over the
//! shared heap model, rather than duplicated per variant.

use crate::heap::region_space::RegionSpace;
use crate::util::ObjectReference;

/// Set or clear `obj`'s bit in its region's mark bitmap. A no-op if `obj` isn't in any
/// known region (this collector doesn't own it).
pub fn set_mark_bit(space: &RegionSpace, obj: ObjectReference, value: bool) {
    if let Some(region) = space.contains_address(obj.to_raw_address()) {
        if value {
            region.mark_bitmap().set(obj.to_raw_address());
        } else {
            region.mark_bitmap().clear(obj.to_raw_address());
        }
    }
}

/// Read `obj`'s mark bit, comparing against `live_sense` (see the `reversed_mark` trick
/// used by [`crate::gc::collector::stw`] and [`crate::gc::collector::generational`]).
/// An object outside any known region reads as unmarked.
pub fn is_marked_with_sense(space: &RegionSpace, obj: ObjectReference, live_sense: bool) -> bool {
    match space.contains_address(obj.to_raw_address()) {
        Some(region) => region.mark_bitmap().is_set(obj.to_raw_address()) == live_sense,
        None => false,
    }
}

/// Transitive mark from `roots` over `trace_object`, marking each newly-reached object via
/// `mark(obj) -> was_already_marked`. Shared by every variant's mark phase.
pub fn transitive_mark(
    roots: &[ObjectReference],
    trace_object: &dyn Fn(ObjectReference, &mut dyn FnMut(ObjectReference)),
    mut mark_if_not_marked: impl FnMut(ObjectReference) -> bool,
) {
    let mut worklist: std::collections::VecDeque<ObjectReference> = std::collections::VecDeque::new();
    for &root in roots {
        if mark_if_not_marked(root) {
            worklist.push_back(root);
        }
    }
    while let Some(obj) = worklist.pop_front() {
        trace_object(obj, &mut |child| {
            if mark_if_not_marked(child) {
                worklist.push_back(child);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region::RegionFlags;
    use crate::heap::region_pool::RegionPool;
    use crate::heap::region_space::SpaceKind;
    use crate::util::constants::BYTES_IN_REGION;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn transitive_mark_visits_every_reachable_object_once() {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 1, true));
        let space = RegionSpace::new(SpaceKind::Object, pool);
        let region = space.new_region(RegionFlags::EDEN, 1);
        let a = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        let b = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        let visited = Mutex::new(HashSet::new());
        let trace = |obj: ObjectReference, visit: &mut dyn FnMut(ObjectReference)| {
            if obj == a {
                visit(b);
            }
        };
        let marked = Mutex::new(HashSet::new());
        transitive_mark(&[a], &trace, |obj| marked.lock().unwrap().insert(obj));
        visited.lock().unwrap().extend(marked.lock().unwrap().iter().copied());
        assert_eq!(marked.lock().unwrap().len(), 2);
        assert!(marked.lock().unwrap().contains(&a));
        assert!(marked.lock().unwrap().contains(&b));
    }
}
