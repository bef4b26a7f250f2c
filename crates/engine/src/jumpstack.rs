//! 점프 스택 — 고정 용량의 복귀 지점 스택
//!
//! 순회마다 스택 위에 만들어지며 힙 할당을 하지 않습니다.

/// 점프 스택 용량 (중첩 점프 최대 깊이)
pub const JUMP_STACK_SIZE: usize = 16;

/// 스택이 가득 차 푸시할 수 없음
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFull;

/// 고정 용량 스택
#[derive(Debug)]
pub struct JumpStack<T> {
    frames: [Option<T>; JUMP_STACK_SIZE],
    len: usize,
}

impl<T> JumpStack<T> {
    pub fn new() -> Self {
        Self {
            frames: std::array::from_fn(|_| None),
            len: 0,
        }
    }

    /// 복귀 지점을 저장합니다. 가득 찼으면 [`StackFull`]
    #[inline]
    pub fn push(&mut self, frame: T) -> Result<(), StackFull> {
        let slot = self.frames.get_mut(self.len).ok_or(StackFull)?;
        *slot = Some(frame);
        self.len += 1;
        Ok(())
    }

    /// 가장 최근 복귀 지점을 꺼냅니다.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        self.frames[self.len].take()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for JumpStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = JumpStack::new();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn push_beyond_capacity_fails() {
        let mut stack = JumpStack::new();
        for i in 0..JUMP_STACK_SIZE {
            stack.push(i).unwrap();
        }
        assert_eq!(stack.push(99), Err(StackFull));
        assert_eq!(stack.len(), JUMP_STACK_SIZE);
        assert_eq!(stack.pop(), Some(JUMP_STACK_SIZE - 1));
    }
}
