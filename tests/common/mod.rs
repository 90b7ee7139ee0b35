//! Shared fixtures for the integration tests.
//!
//! A small widget hierarchy exposed to script:
//!
//! ```text
//! View (internal)
//! ├── Container   addChildView / removeChildView / childCount
//! └── Button      title, buttonType, onClick, onKeyDown
//! Window          title, contentView, onClosed, shouldClose
//! Tray            weakly owned
//! Image           not identity cached
//! ```

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use scriptbridge::prelude::*;
use scriptbridge::{AttachedTable, Exception, NativeConstructor, ObjectRef};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

thread_local! {
    static VIEW_BUILDS: Cell<u32> = const { Cell::new(0) };
    static BUTTON_BUILDS: Cell<u32> = const { Cell::new(0) };
}

pub fn view_builds() -> u32 {
    VIEW_BUILDS.with(Cell::get)
}

pub fn button_builds() -> u32 {
    BUTTON_BUILDS.with(Cell::get)
}

fn bump(counter: &'static std::thread::LocalKey<Cell<u32>>) {
    counter.with(|count| count.set(count.get() + 1));
}

script_enum! {
    pub enum ButtonType as "ButtonType" {
        Normal = "normal",
        Checkbox = "checkbox",
        Radio = "radio",
        Disclosure = "disclosure",
    }
}

// =============================================================================
// View
// =============================================================================

pub struct View {
    pub bounds: Cell<RectF>,
    pub visible: Cell<bool>,
    pub background: Cell<Color>,
    pub focused: Cell<bool>,
    pub layout_reads: Cell<u32>,
}

impl Default for View {
    fn default() -> Self {
        View {
            bounds: Cell::new(RectF::default()),
            visible: Cell::new(true),
            background: Cell::new(Color::from_rgb(0xFF, 0xFF, 0xFF)),
            focused: Cell::new(false),
            layout_reads: Cell::new(0),
        }
    }
}

impl NativeClass for View {
    const NAME: &'static str = "View";
    const INTERNAL: bool = true;

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        bump(&VIEW_BUILDS);
        class
            .property(
                "bounds",
                CacheMode::NoCache,
                |v: &View| v.bounds.get(),
                |v: &View, bounds: RectF| v.bounds.set(bounds),
            )?
            .property(
                "visible",
                CacheMode::NoCache,
                |v: &View| v.visible.get(),
                |v: &View, visible: bool| v.visible.set(visible),
            )?
            .property(
                "backgroundColor",
                CacheMode::NoCache,
                |v: &View| v.background.get(),
                |v: &View, color: Color| v.background.set(color),
            )?
            .readonly("layout", CacheMode::CacheFirstGet, |v: &View| {
                v.layout_reads.set(v.layout_reads.get() + 1);
                vec![v.bounds.get().origin(), PointF::new(0.0, 0.0)]
            })?
            .method("focus", |this: NativeRef<View>| this.focused.set(true))?
            .method("hasFocus", |this: NativeRef<View>| this.focused.get())?;
        Ok(())
    }
}

// =============================================================================
// Container
// =============================================================================

#[derive(Default)]
pub struct Container {
    pub view: View,
    pub children: Cell<usize>,
}

impl AsRef<View> for Container {
    fn as_ref(&self) -> &View {
        &self.view
    }
}

impl NativeClass for Container {
    const NAME: &'static str = "Container";
    const CONSTRUCTOR: Option<NativeConstructor<Self>> = Some(|_| Ok(Rc::new(Container::default())));

    fn base() -> Option<BaseLink> {
        Some(BaseLink::of::<Container, View>())
    }

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class
            .function(
                "addChildView",
                NativeFunction::raw(|args| {
                    let this: NativeRef<Container> = args.holder()?;
                    let child = args.get(0);
                    let _view: NativeRef<View> = args.next()?;
                    if let (Some(owner), Some(key)) = (args.this().as_object(), child.as_object()) {
                        let members = AttachedTable::members(args.context(), owner);
                        if !members.contains(key) {
                            this.children.set(this.children.get() + 1);
                        }
                        members.set(key, child)?;
                    }
                    Ok(Value::Undefined)
                }),
            )?
            .function(
                "removeChildView",
                NativeFunction::raw(|args| {
                    let this: NativeRef<Container> = args.holder()?;
                    let child = args.get(0);
                    if let (Some(owner), Some(key)) = (args.this().as_object(), child.as_object())
                        && AttachedTable::members(args.context(), owner).remove(key).is_some()
                    {
                        this.children.set(this.children.get() - 1);
                    }
                    Ok(Value::Undefined)
                }),
            )?
            .readonly("childCount", CacheMode::NoCache, |c: &Container| c.children.get())?;
        Ok(())
    }
}

// =============================================================================
// Button
// =============================================================================

pub struct Button {
    pub view: View,
    pub title: RefCell<String>,
    pub kind: Cell<ButtonType>,
    pub on_click: Signal<()>,
    pub on_key_down: Event<(String,)>,
}

impl Button {
    pub fn new(title: impl Into<String>) -> Self {
        Button {
            view: View::default(),
            title: RefCell::new(title.into()),
            kind: Cell::new(ButtonType::Normal),
            on_click: Signal::new(),
            on_key_down: Event::new(),
        }
    }

    pub fn click(&self) {
        self.on_click.emit(&());
    }

    pub fn key_down(&self, key: &str) -> bool {
        self.on_key_down.emit(&(key.to_owned(),))
    }
}

impl AsRef<View> for Button {
    fn as_ref(&self) -> &View {
        &self.view
    }
}

fn construct_button(args: &mut scriptbridge::Arguments<'_>) -> Result<Rc<Button>, BridgeError> {
    let title: Option<String> = args.next()?;
    Ok(Rc::new(Button::new(title.unwrap_or_default())))
}

impl NativeClass for Button {
    const NAME: &'static str = "Button";
    const CONSTRUCTOR: Option<NativeConstructor<Self>> = Some(construct_button);

    fn base() -> Option<BaseLink> {
        Some(BaseLink::of::<Button, View>())
    }

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        bump(&BUTTON_BUILDS);
        class
            .property(
                "title",
                CacheMode::NoCache,
                |b: &Button| b.title.borrow().clone(),
                |b: &Button, title: String| *b.title.borrow_mut() = title,
            )?
            .property(
                "buttonType",
                CacheMode::NoCache,
                |b: &Button| b.kind.get(),
                |b: &Button, kind: ButtonType| b.kind.set(kind),
            )?
            .signal("onClick", |b: &Button| &b.on_click)?
            .signal("onKeyDown", |b: &Button| &b.on_key_down)?
            .method("click", |this: NativeRef<Button>| this.click())?
            .static_value("DEFAULT_TITLE", "Button")?;
        Ok(())
    }
}

// =============================================================================
// Window
// =============================================================================

#[derive(Default)]
pub struct Window {
    pub title: RefCell<String>,
    pub content: RefCell<Option<Rc<Container>>>,
    pub closed: Cell<bool>,
    pub on_closed: Signal<()>,
    pub should_close: Delegate<(), bool>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window").field("title", &self.title).finish_non_exhaustive()
    }
}

impl Window {
    /// Ask the delegate, then close. No delegate means yes.
    pub fn close(&self) -> bool {
        if !self.should_close.call(()).unwrap_or(true) {
            return false;
        }
        self.closed.set(true);
        self.on_closed.emit(&());
        true
    }
}

impl NativeClass for Window {
    const NAME: &'static str = "Window";
    const CONSTRUCTOR: Option<NativeConstructor<Self>> = Some(|_| Ok(Rc::new(Window::default())));

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class
            .property(
                "title",
                CacheMode::NoCache,
                |w: &Window| w.title.borrow().clone(),
                |w: &Window, title: String| *w.title.borrow_mut() = title,
            )?
            .property(
                "contentView",
                CacheMode::CacheAlways,
                |w: &Window| w.content.borrow().clone(),
                |w: &Window, view: Option<NativeRef<Container>>| {
                    *w.content.borrow_mut() = view.and_then(|view| view.to_rc())
                },
            )?
            .signal("onClosed", |w: &Window| &w.on_closed)?
            .delegate("shouldClose", |w: &Window| &w.should_close)?
            .method("close", |this: NativeRef<Window>| this.close())?
            .static_method("defaultSize", || SizeF::new(800.0, 600.0))?;
        Ok(())
    }
}

// =============================================================================
// Tray and Image
// =============================================================================

#[derive(Default)]
pub struct Tray {
    pub tooltip: RefCell<String>,
}

impl NativeClass for Tray {
    const NAME: &'static str = "Tray";
    const OWNERSHIP: Ownership = Ownership::OwnedWeak;

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class.property(
            "tooltip",
            CacheMode::NoCache,
            |t: &Tray| t.tooltip.borrow().clone(),
            |t: &Tray, tip: String| *t.tooltip.borrow_mut() = tip,
        )?;
        Ok(())
    }
}

pub struct Image {
    pub size: SizeF,
}

impl NativeClass for Image {
    const NAME: &'static str = "Image";
    const IDENTITY_CACHED: bool = false;

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class.readonly("size", CacheMode::NoCache, |i: &Image| i.size)?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A context with every fixture class exported on the global object.
pub fn context() -> Context {
    context_with(BridgeConfig::default())
}

pub fn context_with(config: BridgeConfig) -> Context {
    init_logging();
    let ctx = Context::with_config(config);
    let global = ctx.runtime().global();
    ctx.export_class::<View>(global).unwrap();
    ctx.export_class::<Container>(global).unwrap();
    ctx.export_class::<Button>(global).unwrap();
    ctx.export_class::<Window>(global).unwrap();
    ctx
}

/// Wrap a native object and return its script object.
pub fn wrap<T: NativeClass>(ctx: &Context, native: &Rc<T>) -> ObjectRef {
    ctx.wrap(NativeHandle::strong(native.clone()))
        .unwrap()
        .as_object()
        .unwrap()
}

/// `new Name(args...)` as script would evaluate it.
pub fn construct(ctx: &Context, class: &str, args: &[Value]) -> Result<Value, Exception> {
    let constructor = ctx.runtime().get(ctx.runtime().global(), class)?;
    ctx.runtime().construct(&constructor, args)
}

/// `target.name(args...)` as script would evaluate it.
pub fn call_method(ctx: &Context, target: &Value, name: &str, args: &[Value]) -> Result<Value, Exception> {
    let function = ctx.runtime().get_value(target, name)?;
    ctx.runtime().call(&function, target, args)
}

/// A script function that counts its calls.
pub fn counting_function(ctx: &Context, calls: &Rc<Cell<u32>>) -> ObjectRef {
    let calls = calls.clone();
    ctx.runtime().new_function("listener", move |_, _, _| {
        calls.set(calls.get() + 1);
        Ok(Value::Undefined)
    })
}

/// A script function returning a fixed value.
pub fn returning_function(ctx: &Context, value: Value) -> ObjectRef {
    ctx.runtime()
        .new_function("handler", move |_, _, _| Ok(value.clone()))
}
