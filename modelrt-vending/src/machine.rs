//! VendingMachine (VM) and its state chart.

use crate::config::MachineConfig;
use crate::payment::{Payment, PaymentStatus};
use crate::product::Product;
use crate::schema::{bridges, events, kinds, messages, rel, states};
use crate::transaction::{Transaction, TransactionStatus};
use crate::ui::UserInterface;
use modelrt_core::{
    bridge_args, instance_arg, ActionContext, ActionResult, Attributes, BridgeArgs,
    CoreError, Entity, InstanceId, InstanceRef, Notifiable, Payload, Runtime, State, StateMachine,
    StateMachineOwner, TimerId, Transition, TransitionTable,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

type Ctx<'a> = ActionContext<'a, VendingMachine>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendingMachineAttrs {
    /// Pending payment timeout, if one is armed.
    pub payment_timer: Option<TimerId>,
}

/// A vending machine driven by its state chart.
pub struct VendingMachine {
    handle: InstanceRef,
    attrs: Attributes<VendingMachineAttrs>,
    settings: MachineConfig,
    machine: StateMachine<VendingMachine>,
}

impl_entity!(VendingMachine);

impl StateMachineOwner for VendingMachine {
    fn state_machine(&self) -> &StateMachine<Self> {
        &self.machine
    }
}

impl VendingMachine {
    pub fn new(
        runtime: &Runtime,
        id: InstanceId,
        table: Arc<TransitionTable<VendingMachine>>,
        settings: MachineConfig,
    ) -> Self {
        Self {
            handle: InstanceRef::new(kinds::VENDING_MACHINE, id),
            attrs: Attributes::new(VendingMachineAttrs::default()),
            settings,
            machine: runtime.new_machine(table),
        }
    }

    /// Creates a machine through the registered factory and relates it to
    /// `ui` across R2.
    pub fn spawn(runtime: &Runtime, ui: &InstanceRef) -> Result<Arc<VendingMachine>, CoreError> {
        let machine = runtime.create_as::<VendingMachine>(kinds::VENDING_MACHINE)?;
        runtime
            .relationships()
            .relate(rel::R2, machine.handle(), ui);
        Ok(machine)
    }

    pub fn attrs(&self) -> &Attributes<VendingMachineAttrs> {
        &self.attrs
    }

    pub fn settings(&self) -> &MachineConfig {
        &self.settings
    }

    pub fn state(&self) -> State {
        self.machine.current_state()
    }

    pub fn payment_timer(&self) -> Option<TimerId> {
        self.attrs.read().payment_timer
    }

    /// Presses the selection button for `code`.
    pub fn select(&self, runtime: &Runtime, code: &str) -> bool {
        let payload = Payload::empty().with(events::PRODUCT_CODE_PARAM, code);
        self.dispatch_event(runtime, events::PRODUCT_SELECTED, payload)
    }

    pub fn selected_product(&self, runtime: &Runtime) -> Option<Arc<Product>> {
        runtime.select_one_related_as::<Product>(rel::R1, self.handle())
    }

    pub fn transaction(&self, runtime: &Runtime) -> Option<Arc<Transaction>> {
        runtime.select_one_related_as::<Transaction>(rel::R3, self.handle())
    }

    pub fn ui(&self, runtime: &Runtime) -> Option<Arc<UserInterface>> {
        runtime.select_one_related_as::<UserInterface>(rel::R2, self.handle())
    }
}

/// The vending machine's transition table.
pub fn transition_table() -> Result<TransitionTable<VendingMachine>, CoreError> {
    chart(states::IDLE)
}

fn chart(initial: &str) -> Result<TransitionTable<VendingMachine>, CoreError> {
    use states::*;

    TransitionTable::builder("VendingMachine")
        .initial(initial)
        .transition(
            Transition::new(IDLE, events::PRODUCT_SELECTED)
                .to(CHECK_STOCK)
                .action(on_product_selected),
        )
        .transition(
            Transition::new(CHECK_STOCK, events::PAYMENT_INITIATED)
                .to(PAYMENT_INITIATED)
                .action(on_payment_initiated),
        )
        .transition(
            Transition::new(CHECK_STOCK, events::STOCK_EMPTY)
                .to(OUT_OF_STOCK)
                .action(on_stock_empty),
        )
        .transition(
            Transition::new(CHECK_STOCK, events::PRODUCT_NOT_FOUND)
                .to(OUT_OF_STOCK)
                .action(raise_reset),
        )
        .transition(
            Transition::new(PAYMENT_INITIATED, events::PRODUCT_NOT_FOUND)
                .to(OUT_OF_STOCK)
                .action(raise_reset),
        )
        .transition(
            Transition::new(PAYMENT_INITIATED, events::PAYMENT_SUCCESS)
                .to(DISPENSING)
                .action(on_payment_success),
        )
        .transition(
            Transition::new(PAYMENT_INITIATED, events::PAYMENT_FAILED)
                .to(ERROR)
                .action(|ctx: &Ctx<'_>| abort_payment(ctx, messages::PAYMENT_FAILED)),
        )
        .transition(
            Transition::new(PAYMENT_INITIATED, events::PAYMENT_TIMEOUT)
                .to(ERROR)
                .action(|ctx: &Ctx<'_>| abort_payment(ctx, messages::PAYMENT_TIMEOUT)),
        )
        .transition(
            Transition::new(PAYMENT_INITIATED, events::CANCEL_ORDER)
                .to(IDLE)
                .action(on_cancel_order),
        )
        .transition(
            Transition::new(DISPENSING, events::ITEM_DISPENSED)
                .to(IDLE)
                .action(on_item_dispensed),
        )
        .transition(
            Transition::new(OUT_OF_STOCK, events::RESET)
                .to(IDLE)
                .action(on_out_of_stock_reset),
        )
        .transition(
            Transition::new(ERROR, events::RESET)
                .to(IDLE)
                .action(on_error_reset),
        )
        .build()
}

// =============================================================================
// Actions
// =============================================================================

fn on_product_selected(ctx: &Ctx<'_>) -> ActionResult {
    let code = ctx
        .payload()
        .get_str(events::PRODUCT_CODE_PARAM)
        .unwrap_or_default();

    let Some(product) = Product::find_by_code(ctx.runtime(), code) else {
        show_error(ctx, messages::PRODUCT_NOT_FOUND);
        ctx.generate(events::PRODUCT_NOT_FOUND, Payload::empty());
        return Ok(());
    };

    // One selection per machine: a new choice replaces the old one.
    clear_selection(ctx);
    ctx.relationships()
        .relate(rel::R1, ctx.handle(), product.handle());

    if product.in_stock() {
        ctx.generate(events::PAYMENT_INITIATED, Payload::empty());
    } else {
        ctx.generate(events::STOCK_EMPTY, Payload::empty());
    }
    Ok(())
}

fn on_payment_initiated(ctx: &Ctx<'_>) -> ActionResult {
    let Some(product) = ctx.select_one_related_as::<Product>(rel::R1) else {
        tracing::warn!("{} lost its selected product; resetting", ctx.handle());
        ctx.generate(events::PRODUCT_NOT_FOUND, Payload::empty());
        return Ok(());
    };
    let runtime = ctx.runtime();
    let amount = product.price();

    let txn = runtime.create_as::<Transaction>(kinds::TRANSACTION)?;
    txn.open(amount);
    ctx.relationships()
        .relate(rel::R3, ctx.handle(), txn.handle());

    let payment = runtime.create_as::<Payment>(kinds::PAYMENT)?;
    let qris = payment.request(txn.handle(), amount);
    ctx.relationships()
        .relate(rel::R4, txn.handle(), payment.handle());

    ctx.bridges().call(
        bridges::PAYMENT_SERVICE,
        "createQR",
        bridge_args([
            ("t_instance", instance_arg(txn.handle())),
            ("amount", json!(amount)),
            ("qrisCode", json!(qris)),
        ]),
    );
    if let Some(ui) = ui(ctx) {
        ui.show_qr();
    }

    arm_payment_timeout(ctx)
}

fn on_stock_empty(ctx: &Ctx<'_>) -> ActionResult {
    show_message(ctx, messages::OUT_OF_STOCK);
    Ok(())
}

fn raise_reset(ctx: &Ctx<'_>) -> ActionResult {
    ctx.generate(events::RESET, Payload::empty());
    Ok(())
}

fn on_payment_success(ctx: &Ctx<'_>) -> ActionResult {
    disarm_payment_timeout(ctx);

    if let Some(txn) = ctx.select_one_related_as::<Transaction>(rel::R3) {
        txn.set_status(TransactionStatus::Completed);
        if let Some(payment) = ctx
            .runtime()
            .select_one_related_as::<Payment>(rel::R4, txn.handle())
        {
            payment.set_status(PaymentStatus::Verified);
        }
    }

    ctx.bridges()
        .call(bridges::DISPENSER, "activateMotor", BridgeArgs::new());
    ctx.generate(events::ITEM_DISPENSED, Payload::empty());
    Ok(())
}

fn abort_payment(ctx: &Ctx<'_>, reason: &str) -> ActionResult {
    show_error(ctx, reason);
    cancel_transaction(ctx);
    clear_selection(ctx);
    ctx.generate(events::RESET, Payload::empty());
    Ok(())
}

fn on_cancel_order(ctx: &Ctx<'_>) -> ActionResult {
    cancel_transaction(ctx);
    clear_selection(ctx);
    show_message(ctx, messages::ORDER_CANCELED);
    Ok(())
}

fn on_item_dispensed(ctx: &Ctx<'_>) -> ActionResult {
    if let Some(product) = ctx.select_one_related_as::<Product>(rel::R1) {
        let new_stock = product.take_one();
        ctx.bridges().call(
            bridges::INVENTORY,
            "updateStock",
            bridge_args([
                ("productCode", json!(product.product_code())),
                ("newStock", json!(new_stock)),
            ]),
        );
        show_message(ctx, messages::ITEM_DISPENSED);
    }

    close_transaction(ctx);
    clear_selection(ctx);
    Ok(())
}

fn on_out_of_stock_reset(ctx: &Ctx<'_>) -> ActionResult {
    show_message(ctx, messages::READY_AFTER_OUT_OF_STOCK);
    clear_selection(ctx);
    Ok(())
}

fn on_error_reset(ctx: &Ctx<'_>) -> ActionResult {
    show_message(ctx, messages::READY_AFTER_ERROR);
    clear_selection(ctx);
    unlink_all(ctx, rel::R3);
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn ui(ctx: &Ctx<'_>) -> Option<Arc<UserInterface>> {
    ctx.select_one_related_as::<UserInterface>(rel::R2)
}

fn show_message(ctx: &Ctx<'_>, text: &str) {
    match ui(ctx) {
        Some(ui) => ui.show_message(text),
        None => tracing::debug!("{} has no UI; message dropped: {}", ctx.handle(), text),
    }
}

fn show_error(ctx: &Ctx<'_>, text: &str) {
    match ui(ctx) {
        Some(ui) => ui.show_error(text),
        None => tracing::debug!("{} has no UI; error dropped: {}", ctx.handle(), text),
    }
}

fn unlink_all(ctx: &Ctx<'_>, rel: &str) {
    for other in ctx.relationships().select_related(rel, ctx.handle()) {
        ctx.relationships().unrelate(rel, ctx.handle(), &other);
    }
}

fn clear_selection(ctx: &Ctx<'_>) {
    unlink_all(ctx, rel::R1);
}

fn arm_payment_timeout(ctx: &Ctx<'_>) -> ActionResult {
    let Some(timeout) = ctx.owner().settings().payment_timeout() else {
        return Ok(());
    };
    let timer = ctx
        .timers()
        .schedule(ctx.handle(), timeout, events::PAYMENT_TIMEOUT)?;
    ctx.owner().attrs.write().payment_timer = Some(timer);
    Ok(())
}

fn disarm_payment_timeout(ctx: &Ctx<'_>) {
    let timer = ctx.owner().attrs.write().payment_timer.take();
    if let Some(timer) = timer {
        ctx.timers().cancel(&timer);
    }
}

/// Marks the open transaction and its payment as failed, then removes them.
fn cancel_transaction(ctx: &Ctx<'_>) {
    disarm_payment_timeout(ctx);
    for txn in ctx.runtime().select_related_as::<Transaction>(rel::R3, ctx.handle()) {
        txn.set_status(TransactionStatus::Canceled);
        for payment in ctx
            .runtime()
            .select_related_as::<Payment>(rel::R4, txn.handle())
        {
            payment.set_status(PaymentStatus::Failed);
        }
    }
    close_transaction(ctx);
}

/// Deletes the machine's transactions and their payments.
fn close_transaction(ctx: &Ctx<'_>) {
    let runtime = ctx.runtime();
    for txn in ctx.relationships().select_related(rel::R3, ctx.handle()) {
        for payment in ctx.relationships().select_related(rel::R4, &txn) {
            runtime.delete_instance(&payment);
        }
        runtime.delete_instance(&txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrt_core::EngineConfig;
    use parking_lot::Mutex;

    #[test]
    fn test_transition_table() {
        let table = transition_table().unwrap();
        assert_eq!(table.initial().as_str(), states::IDLE);
        assert_eq!(table.len(), 12);
        assert_eq!(
            table.events_from(states::PAYMENT_INITIATED),
            vec![
                events::CANCEL_ORDER,
                events::PAYMENT_FAILED,
                events::PAYMENT_SUCCESS,
                events::PAYMENT_TIMEOUT,
                events::PRODUCT_NOT_FOUND,
            ]
        );
        assert_eq!(
            table.events_from(states::CHECK_STOCK),
            vec![
                events::PAYMENT_INITIATED,
                events::PRODUCT_NOT_FOUND,
                events::STOCK_EMPTY,
            ]
        );
        assert!(table.lookup(states::IDLE, events::RESET).is_none());
    }

    #[derive(Default)]
    struct Screen {
        lines: Mutex<Vec<String>>,
    }

    impl Notifiable for Screen {
        fn show_message(&self, text: &str) {
            self.lines.lock().push(format!("message:{}", text));
        }

        fn show_error(&self, text: &str) {
            self.lines.lock().push(format!("error:{}", text));
        }

        fn show_qr(&self) {
            self.lines.lock().push("qr".to_string());
        }
    }

    #[test]
    fn test_lost_product_resets_through_out_of_stock() {
        let runtime = Runtime::new(EngineConfig::default());
        let screen = Arc::new(Screen::default());
        let ui = UserInterface::attach(&runtime, screen.clone());

        // Parked in CheckStock with nothing related across R1.
        let table = Arc::new(chart(states::CHECK_STOCK).unwrap());
        let machine = runtime.insert_stateful(Arc::new(VendingMachine::new(
            &runtime,
            InstanceId::generate(),
            table,
            MachineConfig::default(),
        )));
        runtime
            .relationships()
            .relate(rel::R2, machine.handle(), ui.handle());

        assert!(machine.dispatch_event(&runtime, events::PAYMENT_INITIATED, Payload::empty()));

        assert_eq!(machine.state().as_str(), states::IDLE);
        assert!(machine.transaction(&runtime).is_none());
        assert!(machine.payment_timer().is_none());
        assert_eq!(
            *screen.lines.lock(),
            vec![format!("message:{}", messages::READY_AFTER_OUT_OF_STOCK)]
        );

        let visited: Vec<String> = runtime
            .history(machine.handle())
            .into_iter()
            .filter_map(|entry| entry.to.map(|state| state.0))
            .collect();
        assert_eq!(
            visited,
            vec![
                states::PAYMENT_INITIATED,
                states::OUT_OF_STOCK,
                states::IDLE
            ]
        );
    }
}
