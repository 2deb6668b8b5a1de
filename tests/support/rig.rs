//! Wallet fixture wiring one wallet to the shared hub, plus the event pump
//! the scenarios run on.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use mw_wallet::{
    Amount, Coin, CoinStatus, Keychain, KeyType, MessageEndpoint, NodeGateway, SecondSide, TxId,
    TxRecord, Wallet, WalletConfig, WalletId, WalletStore,
};

use super::external::FakeSecondSide;
use super::hub::{HubEndpoint, HubNodeGateway, TestHub};

pub struct WalletRig {
    pub id: WalletId,
    pub wallet: Wallet,
    pub side: Option<Rc<RefCell<FakeSecondSide>>>,
}

impl WalletRig {
    pub fn new(hub: &Rc<RefCell<TestHub>>, name: &str, coins: &[Amount]) -> Result<WalletRig> {
        Self::build(hub, name, coins, WalletConfig::default(), false)
    }

    pub fn with_swap(
        hub: &Rc<RefCell<TestHub>>,
        name: &str,
        coins: &[Amount],
        config: WalletConfig,
    ) -> Result<WalletRig> {
        Self::build(hub, name, coins, config, true)
    }

    fn build(
        hub: &Rc<RefCell<TestHub>>,
        name: &str,
        coins: &[Amount],
        config: WalletConfig,
        with_side: bool,
    ) -> Result<WalletRig> {
        let id: WalletId = name.to_string();

        let mut store = WalletStore::open_in_memory()?;
        for &value in coins {
            store.store_coin(value, KeyType::Regular, CoinStatus::Available, None)?;
        }

        let side = with_side.then(|| {
            Rc::new(RefCell::new(FakeSecondSide::new(
                hub.clone(),
                id.clone(),
                config.external_lock_time,
            )))
        });

        let node: Rc<RefCell<dyn NodeGateway>> = Rc::new(RefCell::new(HubNodeGateway {
            hub: hub.clone(),
            wallet_id: id.clone(),
            second_side: side
                .clone()
                .map(|side| side as Rc<RefCell<dyn SecondSide>>),
        }));
        let endpoint: Rc<RefCell<dyn MessageEndpoint>> =
            Rc::new(RefCell::new(HubEndpoint { hub: hub.clone() }));

        let wallet = Wallet::new(store, Keychain::random(), config, node, endpoint);
        Ok(WalletRig { id, wallet, side })
    }

    pub fn coins(&self) -> Vec<Coin> {
        self.wallet.store().coins().expect("read coins")
    }

    pub fn history(&self) -> Vec<TxRecord> {
        self.wallet.store().tx_history().expect("read history")
    }

    pub fn tx(&self, tx_id: TxId) -> Option<TxRecord> {
        self.wallet.store().get_tx(tx_id).expect("read tx")
    }

    pub fn available_total(&self) -> Amount {
        self.wallet.store().available_total().expect("sum coins")
    }

    /// Asserts the full coin table as (value, status, key-type) in creation
    /// order.
    pub fn assert_coins(&self, expected: &[(Amount, CoinStatus, KeyType)]) {
        let coins: Vec<_> = self
            .coins()
            .into_iter()
            .map(|coin| (coin.id.value, coin.status, coin.id.key_type))
            .collect();
        assert_eq!(coins, expected, "coin table of {}", self.id);
    }
}

/// Delivers queued messages and node events until every queue is dry.
pub fn pump(hub: &Rc<RefCell<TestHub>>, rigs: &mut [&mut WalletRig]) -> Result<()> {
    loop {
        let mut progressed = false;
        for rig in rigs.iter_mut() {
            loop {
                let msg = hub.borrow_mut().take_message(&rig.id);
                let Some(msg) = msg else { break };
                progressed = true;
                rig.wallet.on_message(msg)?;
            }
            loop {
                let event = hub.borrow_mut().take_event(&rig.id);
                let Some(event) = event else { break };
                progressed = true;
                rig.wallet.handle_event(event)?;
            }
        }
        if !progressed {
            return Ok(());
        }
    }
}

/// Mines `n` blocks, pumping all deliveries after each one.
pub fn add_blocks(hub: &Rc<RefCell<TestHub>>, rigs: &mut [&mut WalletRig], n: usize) -> Result<()> {
    for _ in 0..n {
        hub.borrow_mut().add_block();
        pump(hub, rigs)?;
    }
    Ok(())
}
