mod support;

use anyhow::Result;

use mw_wallet::{FailureReason, KeyType, SwapCoin, SwapParams, TxStatus, WalletConfig};
use support::{TestHub, WalletRig, add_blocks, pump};

use mw_wallet::CoinStatus::{Available, Spent};
use mw_wallet::KeyType::{Change, Regular};

fn swap_params(is_sender: bool) -> SwapParams {
    SwapParams {
        amount: 3,
        fee: 1,
        swap_coin: SwapCoin::Bitcoin,
        swap_amount: 2000,
        swap_fee_rate: 256,
        is_sender,
    }
}

fn run_swap(native_owner_initiates: bool) -> Result<()> {
    let hub = TestHub::new();
    let config = WalletConfig::default();
    let mut sender = WalletRig::with_swap(&hub, "sender", &[5, 2, 1, 9], config.clone())?;
    let mut receiver = WalletRig::with_swap(&hub, "receiver", &[], config)?;

    let tx_id = if native_owner_initiates {
        sender
            .wallet
            .swap("sender".into(), "receiver".into(), swap_params(true))?
    } else {
        receiver
            .wallet
            .swap("receiver".into(), "sender".into(), swap_params(false))?
    };

    assert!(receiver.coins().is_empty());

    pump(&hub, &mut [&mut sender, &mut receiver])?;
    for _ in 0..16 {
        add_blocks(&hub, &mut [&mut sender, &mut receiver], 1)?;
        let done = [&sender, &receiver]
            .iter()
            .all(|rig| rig.tx(tx_id).is_some_and(|tx| tx.status.is_terminal()));
        if done {
            break;
        }
    }

    let stx = sender.tx(tx_id).expect("sender history entry");
    let rtx = receiver.tx(tx_id).expect("receiver history entry");
    assert_eq!(stx.status, TxStatus::Completed);
    assert_eq!(rtx.status, TxStatus::Completed);
    assert_eq!(stx.amount, 3);
    assert_eq!(stx.fee, 1);

    // the receiver holds the redeemed native coin
    let receiver_coins = receiver.coins();
    assert_eq!(receiver_coins.len(), 1);
    assert_eq!(receiver_coins[0].id.value, 3);
    assert_eq!(receiver_coins[0].status, Available);
    assert_eq!(receiver_coins[0].create_tx_id, Some(tx_id));

    // the sender spent the 5-coin and got 1 back as change
    let sender_coins = sender.coins();
    assert_eq!(sender_coins.len(), 5);
    assert_eq!(sender_coins[0].id.value, 5);
    assert_eq!(sender_coins[0].status, Spent);
    assert_eq!(sender_coins[0].spent_tx_id, Some(tx_id));
    assert_eq!(sender_coins[4].id.value, 1);
    assert_eq!(sender_coins[4].status, Available);
    assert_eq!(sender_coins[4].id.key_type, Change);
    assert_eq!(sender_coins[4].create_tx_id, Some(tx_id));

    // and claimed the external side of the bargain
    assert_eq!(hub.borrow().external.claimed(&"sender".to_string()), 2000);
    Ok(())
}

#[test]
fn atomic_swap_seller_initiated() -> Result<()> {
    run_swap(true)
}

#[test]
fn atomic_swap_buyer_initiated() -> Result<()> {
    run_swap(false)
}

#[test]
fn swap_native_refund_when_peer_disappears() -> Result<()> {
    let hub = TestHub::new();
    let config = WalletConfig {
        native_lock_time: 4,
        external_lock_time: 8,
        ..WalletConfig::default()
    };
    let mut sender = WalletRig::with_swap(&hub, "sender", &[5, 2, 1, 9], config.clone())?;
    let mut receiver = WalletRig::with_swap(&hub, "receiver", &[], config)?;

    let tx_id = sender
        .wallet
        .swap("sender".into(), "receiver".into(), swap_params(true))?;

    // negotiation completes and the external lock is published, then the
    // external owner goes silent before redeeming
    pump(&hub, &mut [&mut sender, &mut receiver])?;
    for _ in 0..10 {
        add_blocks(&hub, &mut [&mut sender], 1)?;
        if sender.tx(tx_id).is_some_and(|tx| tx.status.is_terminal()) {
            break;
        }
    }

    // past the native lock-time the pre-signed refund is the terminal step
    let stx = sender.tx(tx_id).expect("sender history entry");
    assert_eq!(stx.status, TxStatus::Completed);
    sender.assert_coins(&[
        (5, Spent, Regular),
        (2, Available, Regular),
        (1, Available, Regular),
        (9, Available, Regular),
        (1, Available, Change),
        (3, Available, KeyType::Shared),
    ]);

    // nothing was redeemed on the external chain
    assert_eq!(hub.borrow().external.claimed(&"sender".to_string()), 0);
    assert_eq!(hub.borrow().external.claimed(&"receiver".to_string()), 0);
    Ok(())
}

#[test]
fn swap_refunds_both_sides_when_external_lock_never_confirms() -> Result<()> {
    let hub = TestHub::new();
    let config = WalletConfig {
        native_lock_time: 4,
        external_lock_time: 8,
        ..WalletConfig::default()
    };
    let mut sender = WalletRig::with_swap(&hub, "sender", &[5, 2, 1, 9], config.clone())?;
    let mut receiver = WalletRig::with_swap(&hub, "receiver", &[], config)?;

    // the native owner never sees the external lock confirm
    sender
        .side
        .as_ref()
        .expect("swap side")
        .borrow_mut()
        .confirm_lock_enabled = false;

    let tx_id = sender
        .wallet
        .swap("sender".into(), "receiver".into(), swap_params(true))?;
    pump(&hub, &mut [&mut sender, &mut receiver])?;

    for _ in 0..16 {
        add_blocks(&hub, &mut [&mut sender, &mut receiver], 1)?;
        let done = [&sender, &receiver]
            .iter()
            .all(|rig| rig.tx(tx_id).is_some_and(|tx| tx.status.is_terminal()));
        if done {
            break;
        }
    }

    // the native owner abandoned the swap past the deadline; its reserved
    // coins are spendable again
    let stx = sender.tx(tx_id).expect("sender history entry");
    assert_eq!(stx.status, TxStatus::Failed);
    assert_eq!(
        stx.failure_reason,
        Some(FailureReason::SwapSecondChainFailure)
    );
    sender.assert_coins(&[
        (5, Available, Regular),
        (2, Available, Regular),
        (1, Available, Regular),
        (9, Available, Regular),
    ]);

    // the external owner recovered its funds through the refund path
    let rtx = receiver.tx(tx_id).expect("receiver history entry");
    assert_eq!(rtx.status, TxStatus::Completed);
    assert!(receiver.coins().is_empty());
    assert_eq!(hub.borrow().external.claimed(&"receiver".to_string()), 2000);
    assert_eq!(hub.borrow().external.claimed(&"sender".to_string()), 0);
    Ok(())
}
