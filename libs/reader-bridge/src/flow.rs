use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;

use crate::WindowSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Следующий pull уже запланирован или будет запланирован.
    Flowing,
    /// Окно исчерпано, ждём ack или ошибку отправки.
    Paused,
    /// Терминальное состояние, новых pull'ов не будет.
    Closed,
}

/// Credit-based flow control: число доставок, отправленных клиенту,
/// но ещё не подтверждённых, против размера окна.
///
/// Все переходы: атомарные RMW над одним счётчиком; `pending` никогда
/// не уходит ниже нуля. В steady state `pending <= window`, но гонка
/// pipelining может кратковременно дать `window + 1`.
#[derive(Debug)]
pub struct FlowController {
    pending: AtomicUsize,
    window: usize,
    closed: AtomicBool,
}

impl FlowController {
    pub fn new(window: WindowSize) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            window: window.get(),
            closed: AtomicBool::new(false),
        }
    }

    /// Учесть доставку после успешного pull'а. `true`: сразу
    /// запрашивать следующее сообщение (окно ещё не заполнено).
    pub fn try_pipeline_after_pull(&self) -> bool {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        pending < self.window && !self.is_closed()
    }

    /// Клиент прислал ack. `true`: цикл стоял на паузе и его надо разбудить.
    pub fn release_on_ack(&self) -> bool {
        match self.decrement() {
            Some(prev) => prev >= self.window && !self.is_closed(),
            None => false,
        }
    }

    /// Отправка в transport не удалась. Кредит возвращается и цикл
    /// всегда перевзводится, чтобы окно не заклинило.
    pub fn release_on_push_failure(&self) -> bool {
        self.decrement();
        !self.is_closed()
    }

    /// Перевести в Closed. `true` только для первого вызова.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn state(&self) -> FlowState {
        if self.is_closed() {
            FlowState::Closed
        } else if self.pending() >= self.window {
            FlowState::Paused
        } else {
            FlowState::Flowing
        }
    }

    /// Декремент с полом в нуле. Возвращает значение до декремента.
    fn decrement(&self) -> Option<usize> {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1))
            .ok()
    }
}
