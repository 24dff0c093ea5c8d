/// 以主键标识的列表元素
pub trait Keyed {
    fn entity_id(&self) -> &str;
}

/// 主键不存在时插入；`at_front` 为真时插到表头。返回是否插入
pub fn insert_unique<T: Keyed>(list: &mut Vec<T>, item: T, at_front: bool) -> bool {
    if contains_key(list, item.entity_id()) {
        return false;
    }
    if at_front {
        list.insert(0, item);
    } else {
        list.push(item);
    }
    true
}

pub fn contains_key<T: Keyed>(list: &[T], key: &str) -> bool {
    list.iter().any(|item| item.entity_id() == key)
}

/// 按主键原位修改，未命中返回 false
pub fn update_by_key<T: Keyed>(list: &mut [T], key: &str, f: impl FnOnce(&mut T)) -> bool {
    match list.iter_mut().find(|item| item.entity_id() == key) {
        Some(item) => {
            f(item);
            true
        }
        None => false,
    }
}

pub fn remove_by_key<T: Keyed>(list: &mut Vec<T>, key: &str) -> Option<T> {
    let index = list.iter().position(|item| item.entity_id() == key)?;
    Some(list.remove(index))
}

/// 把指定元素移到表头，保持其余元素的相对顺序
pub fn move_to_front<T: Keyed>(list: &mut [T], key: &str) -> bool {
    match list.iter().position(|item| item.entity_id() == key) {
        Some(index) => {
            list[..=index].rotate_right(1);
            true
        }
        None => false,
    }
}
