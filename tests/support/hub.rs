//! In-process fakes for the node gateway and the peer transport. One hub
//! instance plays the chain and the network for every wallet in a test;
//! results are delivered as queued events the test pump feeds back into the
//! wallets, mirroring the asynchronous callbacks of a real deployment.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;

use mw_wallet::wallet::swap::second_side::SecondSide;
use mw_wallet::{
    ChainState, CoinId, Height, KernelId, MessageEndpoint, NodeGateway, SetTxParameter, SubTxId,
    Transaction, TxId, WalletEvent, WalletId,
};

/// Minimal native chain: a height and the set of confirmed kernels. A
/// registered transaction is validated and, if accepted, mined immediately
/// at the current height.
#[derive(Default)]
pub struct NativeChain {
    pub height: Height,
    kernels: HashMap<KernelId, (Height, Option<[u8; 32]>)>,
    spent_inputs: HashSet<[u8; 33]>,
}

impl NativeChain {
    pub fn has_kernel(&self, kernel_id: &KernelId) -> bool {
        self.kernels.contains_key(kernel_id)
    }
}

pub struct TestHub {
    pub chain: NativeChain,
    pub external: super::external::ExternalChain,
    inboxes: HashMap<WalletId, VecDeque<SetTxParameter>>,
    events: HashMap<WalletId, VecDeque<WalletEvent>>,
    registered: HashSet<(TxId, SubTxId)>,
    kernel_watches: HashSet<(WalletId, TxId, SubTxId, KernelId)>,
    kernel_reads: HashSet<(WalletId, TxId, SubTxId, KernelId)>,
    tip_subscriptions: HashSet<(WalletId, TxId)>,
    drop_messages: bool,
}

impl TestHub {
    pub fn new() -> Rc<RefCell<TestHub>> {
        Rc::new(RefCell::new(TestHub {
            chain: NativeChain {
                height: 1,
                ..NativeChain::default()
            },
            external: super::external::ExternalChain::new(),
            inboxes: HashMap::new(),
            events: HashMap::new(),
            registered: HashSet::new(),
            kernel_watches: HashSet::new(),
            kernel_reads: HashSet::new(),
            tip_subscriptions: HashSet::new(),
            drop_messages: false,
        }))
    }

    pub fn set_drop_messages(&mut self, drop: bool) {
        self.drop_messages = drop;
    }

    pub fn clear_messages(&mut self) {
        self.inboxes.clear();
    }

    pub fn take_message(&mut self, wallet_id: &WalletId) -> Option<SetTxParameter> {
        self.inboxes.get_mut(wallet_id)?.pop_front()
    }

    pub fn take_event(&mut self, wallet_id: &WalletId) -> Option<WalletEvent> {
        self.events.get_mut(wallet_id)?.pop_front()
    }

    fn push_event(&mut self, wallet_id: &WalletId, event: WalletEvent) {
        self.events.entry(wallet_id.clone()).or_default().push_back(event);
    }

    fn register(&mut self, wallet_id: &WalletId, tx_id: TxId, sub_tx_id: SubTxId, tx: Transaction) {
        if self.registered.contains(&(tx_id, sub_tx_id)) {
            return;
        }
        self.registered.insert((tx_id, sub_tx_id));

        let accepted = self.validate(&tx);
        if accepted {
            for input in &tx.inputs {
                self.chain.spent_inputs.insert(input.commitment.serialize());
            }
            self.chain
                .kernels
                .insert(tx.kernel.id(), (self.chain.height, tx.preimage));
        }
        self.push_event(wallet_id, WalletEvent::Registered { tx_id, sub_tx_id, accepted });
    }

    fn validate(&self, tx: &Transaction) -> bool {
        if tx.validate().is_err() {
            return false;
        }
        if tx.kernel.min_height > self.chain.height || self.chain.height > tx.kernel.max_height {
            return false;
        }
        tx.inputs
            .iter()
            .all(|input| !self.chain.spent_inputs.contains(&input.commitment.serialize()))
    }

    /// Mines one block: answers every pending kernel watch and fires the
    /// one-shot tip subscriptions. The external chain advances in lockstep.
    pub fn add_block(&mut self) {
        self.chain.height += 1;
        self.external.height += 1;

        let watches: Vec<_> = self.kernel_watches.iter().cloned().collect();
        for (wallet_id, tx_id, sub_tx_id, kernel_id) in watches {
            let height = self.chain.kernels.get(&kernel_id).map(|(h, _)| *h);
            if height.is_some() {
                self.kernel_watches.remove(&(wallet_id.clone(), tx_id, sub_tx_id, kernel_id));
            }
            let tip = self.chain.height;
            self.push_event(
                &wallet_id,
                WalletEvent::KernelProof { tx_id, sub_tx_id, kernel_id, height, tip },
            );
        }

        let reads: Vec<_> = self.kernel_reads.iter().cloned().collect();
        for (wallet_id, tx_id, sub_tx_id, kernel_id) in reads {
            if let Some((_, preimage)) = self.chain.kernels.get(&kernel_id).copied() {
                self.kernel_reads.remove(&(wallet_id.clone(), tx_id, sub_tx_id, kernel_id));
                self.push_event(&wallet_id, WalletEvent::KernelData { tx_id, sub_tx_id, preimage });
            }
        }

        let subscriptions: Vec<_> = self.tip_subscriptions.drain().collect();
        for (wallet_id, tx_id) in subscriptions {
            self.push_event(&wallet_id, WalletEvent::TipUpdate(tx_id));
        }
    }
}

/// Per-wallet handle implementing the node gateway against the shared hub.
pub struct HubNodeGateway {
    pub hub: Rc<RefCell<TestHub>>,
    pub wallet_id: WalletId,
    pub second_side: Option<Rc<RefCell<dyn SecondSide>>>,
}

impl NodeGateway for HubNodeGateway {
    fn register_tx(&mut self, tx_id: TxId, sub_tx_id: SubTxId, tx: Transaction) {
        self.hub
            .borrow_mut()
            .register(&self.wallet_id, tx_id, sub_tx_id, tx);
    }

    fn confirm_kernel(&mut self, tx_id: TxId, sub_tx_id: SubTxId, kernel_id: KernelId) {
        let mut hub = self.hub.borrow_mut();
        if let Some((height, _)) = hub.chain.kernels.get(&kernel_id).copied() {
            let tip = hub.chain.height;
            hub.push_event(
                &self.wallet_id,
                WalletEvent::KernelProof { tx_id, sub_tx_id, kernel_id, height: Some(height), tip },
            );
        } else {
            hub.kernel_watches
                .insert((self.wallet_id.clone(), tx_id, sub_tx_id, kernel_id));
        }
    }

    fn confirm_outputs(&mut self, coins: Vec<CoinId>) {
        let mut hub = self.hub.borrow_mut();
        let height = hub.chain.height;
        for coin in coins {
            hub.push_event(
                &self.wallet_id,
                WalletEvent::OutputConfirmed { idx: coin.idx, height },
            );
        }
    }

    fn get_kernel(&mut self, tx_id: TxId, sub_tx_id: SubTxId, kernel_id: KernelId) {
        let mut hub = self.hub.borrow_mut();
        if let Some((_, preimage)) = hub.chain.kernels.get(&kernel_id).copied() {
            hub.push_event(
                &self.wallet_id,
                WalletEvent::KernelData { tx_id, sub_tx_id, preimage },
            );
        } else {
            hub.kernel_reads
                .insert((self.wallet_id.clone(), tx_id, sub_tx_id, kernel_id));
        }
    }

    fn get_tip(&self) -> Option<ChainState> {
        Some(ChainState {
            height: self.hub.borrow().chain.height,
        })
    }

    fn update_on_next_tip(&mut self, tx_id: TxId) {
        self.hub
            .borrow_mut()
            .tip_subscriptions
            .insert((self.wallet_id.clone(), tx_id));
    }

    fn get_second_side(&self, _tx_id: TxId) -> Option<Rc<RefCell<dyn SecondSide>>> {
        self.second_side.clone()
    }
}

/// Peer transport delivering into the recipient's hub inbox.
pub struct HubEndpoint {
    pub hub: Rc<RefCell<TestHub>>,
}

impl MessageEndpoint for HubEndpoint {
    fn send(&mut self, msg: SetTxParameter) -> Result<()> {
        let mut hub = self.hub.borrow_mut();
        if hub.drop_messages {
            return Ok(());
        }
        let to = msg.to.clone();
        hub.inboxes.entry(to).or_default().push_back(msg);
        Ok(())
    }
}
